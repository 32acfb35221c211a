pub mod handlers;
pub mod http;
pub mod registry;
pub mod store;
