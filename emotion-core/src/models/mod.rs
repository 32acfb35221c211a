pub mod event;
pub mod session;

pub use event::{EmotionEvent, NewEmotionEvent};
pub use session::Session;
