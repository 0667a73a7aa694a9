use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::core::config::{self, AppConfig};
use crate::core::engine::{AgentEngine, ProcessEngine};
use crate::core::scheduler::Scheduler;
use crate::core::store::Store;
use crate::interfaces::web::{self, AppState};
use crate::logging::LogFanoutWriter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct ServeArgs {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
}

/// Boots the daemon: logging, config, store, engine, scheduler, HTTP server.
/// Runs until Ctrl-C.
pub(super) async fn run_serve(args: ServeArgs) -> Result<()> {
    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(500);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(LogFanoutWriter {
            sender: log_tx.clone(),
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let data_dir = args
        .data_dir
        .or_else(|| std::env::var("FEEDLINE_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(config::default_data_dir);
    let config = AppConfig::load(&data_dir)?;
    let host = args.host.unwrap_or(config.server.host);
    let port = args.port.unwrap_or(config.server.port);

    info!(
        "Starting feedline daemon (data dir: {})",
        data_dir.display()
    );
    let store = Store::new(&data_dir).await?;
    let engine: Arc<dyn AgentEngine> = Arc::new(ProcessEngine::new(config.engine));
    let scheduler = Scheduler::start(store.clone(), engine.clone()).await?;
    scheduler.reconcile().await?;

    let state = AppState {
        store,
        engine,
        scheduler,
        log_tx,
    };
    web::serve(state, &host, port).await
}
