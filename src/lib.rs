pub mod admin;
pub mod afk;
pub mod config;
pub mod control;
pub mod entities;
pub mod error;
pub mod persistence;
pub mod telemetry;
pub mod text;
pub mod world;

pub use afk::engine::{AfkEngine, JoinOutcome, ReturnDestination, Transition};
pub use afk::runtime::AfkRuntime;
pub use afk::signals::{ActivityListener, ActivitySignal, Verdict};
pub use config::Settings;
pub use control::ServerControl;
pub use error::{ConfigError, HostError, PersistenceError, TransitionError};
pub use world::host::{BlockKind, BlockView, EntityId, Host};
pub use world::position::Location;

use persistence::backup::BackupStore;
use std::sync::Arc;
use world::sim::SimHost;

pub fn run(args: &[String]) -> Result<(), String> {
    let config = config::AppConfig::from_args(args)?;
    let (settings, issues) = Settings::load(&config.root).map_err(|err| err.to_string())?;
    let log_path = telemetry::logging::init(&config.root, settings.settings.debug)?;
    tracing::info!("smartafk starting, log file {}", log_path.display());
    for issue in &issues {
        tracing::warn!("config {}: {}", issue.key, issue.message);
    }

    let host = Arc::new(SimHost::new());
    let engine = Arc::new(AfkEngine::new(
        Arc::clone(&host),
        settings,
        BackupStore::from_root(&config.root),
    ));
    let runtime = AfkRuntime::start(Arc::clone(&engine));
    let listener = ActivityListener::new(Arc::clone(&engine));
    println!("smartafk: console ready, type 'help' for commands");

    let stdin = std::io::stdin();
    let console = admin::console::run_console(&listener, &host, &config.root, stdin.lock());
    match runtime.shutdown() {
        Ok(saved) => tracing::info!("smartafk stopped ({} entities kept in backup)", saved),
        Err(err) => tracing::error!("final backup failed: {}", err),
    }
    console
}
