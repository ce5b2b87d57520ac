use std::sync::Arc;

use clap::Parser;
use pulse_core::{PulseConfig, SystemClock};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use pulse_server::http;
use pulse_server::subsystems::source::create_source_from_config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "pulse.toml")]
    config: String,

    /// Validate config and build the conversation source, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match PulseConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging: RUST_LOG wins, config level otherwise
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let source = match create_source_from_config(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to create conversation source: {}", e);
            std::process::exit(1);
        }
    };

    if args.check {
        println!("✅ Config loaded from {}", args.config);
        println!("✅ Conversation source: {}", source.name());
        println!(
            "✅ Cache: {}",
            if config.cache.enabled {
                format!("{}s TTL, {} entries", config.cache.ttl_seconds, config.cache.max_entries)
            } else {
                "disabled".to_string()
            }
        );
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    http::start_http_server(source, config, Arc::new(SystemClock), tx.subscribe()).await?;

    Ok(())
}
