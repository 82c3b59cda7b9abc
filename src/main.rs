use clap::Parser;
use duet::adapters::{ExchangeClient, RestExchange, SimulatedExchange};
use duet::api::{create_router, AppState};
use duet::cli::{Cli, Commands};
use duet::config::{AppConfig, LoggingConfig};
use duet::error::{DuetError, Result};
use duet::strategy::Engine;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::CheckConfig) => {
            init_logging_simple();
            let config = load_config(&cli)?;
            match config.validate() {
                Ok(()) => {
                    println!("configuration ok");
                    Ok(())
                }
                Err(violations) => {
                    for v in &violations {
                        eprintln!("  - {v}");
                    }
                    Err(DuetError::Validation(format!(
                        "{} configuration violation(s)",
                        violations.len()
                    )))
                }
            }
        }
        Some(Commands::Run { autostart }) => run_engine(&cli, *autostart).await,
        None => run_engine(&cli, false).await,
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let config = match AppConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            // The subscriber is not up yet in the run path
            eprintln!("config load failed ({e}), using defaults");
            AppConfig::default_config(cli.dry_run, &cli.symbol)
        }
    };
    config
        .validate()
        .map_err(|violations| DuetError::Validation(violations.join("; ")))?;
    Ok(config)
}

async fn run_engine(cli: &Cli, autostart: bool) -> Result<()> {
    let config = load_config(cli)?;
    init_logging(&config.logging);
    let api_port = config.api_port;

    let client: Arc<dyn ExchangeClient> = if config.dry_run.enabled {
        info!("dry run mode, using simulated exchange");
        Arc::new(SimulatedExchange::new().with_fill_chance_pct(5))
    } else {
        Arc::new(RestExchange::new(config.market.rest_url.clone())?)
    };

    let engine = Arc::new(Engine::new(config, client));
    if autostart {
        engine.start().await?;
    }

    // Scheduler loop
    tokio::spawn(Arc::clone(&engine).run());

    // Status/config API
    let state = AppState::new(Arc::clone(&engine));
    let router = create_router(state);
    let addr = format!("0.0.0.0:{api_port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "status api listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("api server error: {e}");
        }
    });

    shutdown_signal().await;
    warn!("shutdown signal received, tripping kill switch");
    engine.kill();

    // Give drivers a moment to unwind resting orders
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(10);
    while engine.store().non_terminal_count().await > 0 {
        if tokio::time::Instant::now() >= deadline {
            error!("cycles still unwinding at shutdown deadline");
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
    info!("shutdown complete");
    Ok(())
}

/// Directive string derived from the configured level; RUST_LOG still
/// wins when set.
fn log_directives(logging: &LoggingConfig) -> String {
    format!("info,duet={}", logging.level)
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directives(logging)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
