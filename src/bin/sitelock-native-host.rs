//! Chrome Native Messaging Host for sitelock
//!
//! This binary owns the blocking rules for the sitelock extension. It
//! communicates via stdin/stdout using Chrome's native messaging protocol;
//! logs go to stderr.

use log::{error, info};
use sitelock_lib::{
    config::Config,
    db::{migrations, Database},
    engine::{BlockingEngine, MemoryEngine},
    error::AppError,
    native_host::NativeHost,
    schedule::SystemClock,
    store::{SettingsStore, SqliteStore},
    sync::RuleSynchronizer,
};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn open_store(config: &Config) -> Result<SqliteStore, AppError> {
    let db_path = config.db_path()?;
    let db = Database::open(&db_path)?;
    migrations::run(db.connection())?;
    info!("Using settings database {}", db_path.display());
    Ok(SqliteStore::new(Arc::new(Mutex::new(db))))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Initialization error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let store = match open_store(&config) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open settings store: {e}");
            return ExitCode::FAILURE;
        }
    };

    let first_run = match store.needs_install() {
        Ok(first_run) => first_run,
        Err(e) => {
            error!("Failed to inspect settings store: {e}");
            return ExitCode::FAILURE;
        }
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    let engine: Arc<dyn BlockingEngine> = Arc::new(MemoryEngine::new(config.max_rules));
    let synchronizer = Arc::new(RuleSynchronizer::new(
        Arc::clone(&store),
        engine,
        Arc::new(SystemClock),
        config.compiler(),
    ));

    let listener = synchronizer.start(first_run).await;
    let ticker = config
        .recheck_interval()
        .map(|period| synchronizer.spawn_schedule_ticker(period));

    let host = NativeHost::new(Arc::clone(&synchronizer), store);

    // Runs until Chrome closes the connection
    let result = host.run(tokio::io::stdin(), tokio::io::stdout()).await;

    listener.abort();
    if let Some(ticker) = ticker {
        ticker.abort();
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Native host error: {e}");
            ExitCode::FAILURE
        }
    }
}
