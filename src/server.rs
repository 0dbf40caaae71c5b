//! Tracing setup and server startup.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pushbridge_api::{ApiConfig, ApiServer, AppState};
use pushbridge_config::{Config, ConfigValidator, LoggingConfig};

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize tracing with console output and, when a directory is
/// configured, a daily rolling log file.
///
/// `RUST_LOG` takes precedence over `logging.level`.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match logging.directory.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("pushbridge")
                .filename_suffix("log")
                .max_log_files(30)
                .build(Path::new(dir))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = GUARD.set(guard);
            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .init();

    Ok(())
}

/// Validate `config` and serve until shutdown.
pub(crate) async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let warnings = ConfigValidator::validate(&config).into_result()?;
    for warning in &warnings {
        warn!("config {}: {}", warning.path, warning.message);
    }

    info!(
        public_accounts = config.routing.public_accounts.len(),
        response_timeout_secs = config.sse.response_timeout_secs,
        "starting pushbridge"
    );

    let state = Arc::new(AppState::from_config(&config));
    let server = ApiServer::new(ApiConfig::from_config(&config), state);
    server.run().await
}

/// Print validation errors and warnings. Returns whether the config is valid.
pub(crate) fn check_config(config: &Config) -> bool {
    let result = ConfigValidator::validate(config);
    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }
    result.is_valid()
}
