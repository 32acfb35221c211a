use std::sync::Arc;

use clap::Parser;
use emotion_core::EmotionConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use emotion_server::handlers::AppState;
use emotion_server::store::EventStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "emotion.toml")]
    config: String,

    /// Check database connectivity and exit
    #[arg(long)]
    health: bool,

    /// Run one retention sweep with the configured window and exit
    #[arg(long)]
    prune: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match EmotionConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    match config
        .service
        .log_level
        .parse::<tracing_subscriber::filter::Directive>()
    {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log_level {:?}: {}", config.service.log_level, e),
    }
    fmt().with_env_filter(filter).init();

    // Connect to DB and ensure the schema exists
    let pool = match emotion_core::db::open_database(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match emotion_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ SQLite connected: {}", v),
            Err(e) => {
                println!("❌ SQLite connection failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Emotion DB health check passed");
        return Ok(());
    }

    if args.prune {
        let store = EventStore::new(pool);
        let pruned = store.prune_older_than(config.retention.window_days).await?;
        println!(
            "Pruned {} emotion events older than {} days",
            pruned, config.retention.window_days
        );
        return Ok(());
    }

    let strategy = emotion_core::create_strategy(&config.inference);
    tracing::info!(strategy = strategy.name(), "Inference strategy selected");

    let state = Arc::new(AppState::new(pool, strategy, config));

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    emotion_server::http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
