//! Autobook - 自动抢单引擎
//!
//! 入口：加载配置、初始化日志，从 stdin（或参数指定的 JSONL 文件）读取入站事件并运行调度循环。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use autobook::automation::{AutomationEngine, Dispatcher};
use autobook::config::{load_config, AppConfig};
use autobook::core::{SessionSupervisor, ShutdownManager, ShutdownReason};
use autobook::observability::{self, LogTail, StatsCounters};
use autobook::transport::{read_events, ReplayTransport, SenderFilter};
use tokio::io::BufReader;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("AUTOBOOK_CONFIG").map(PathBuf::from);
    let (config, config_error) = match load_config(config_path) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    let tail = LogTail::new(config.app.log_tail_capacity);
    observability::init(&tail);
    if let Some(e) = config_error {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }
    config
        .automation
        .validate()
        .context("Invalid automation config")?;
    tracing::info!(
        app = config.app.name.as_deref().unwrap_or("autobook"),
        tracked_sender = ?config.app.tracked_sender,
        strategy = ?config.automation.selection_strategy,
        "Starting"
    );

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();
    let supervisor = SessionSupervisor::with_parent(shutdown.token());

    let stats = Arc::new(StatsCounters::new());
    let transport = Arc::new(ReplayTransport::new());
    let debounce = config.automation.debounce_window();
    let engine = AutomationEngine::new(config.automation.clone(), transport.clone(), Arc::clone(&stats));
    let mut dispatcher = Dispatcher::new(engine, SenderFilter::new(config.app.tracked_sender), debounce);

    let (tx, rx) = mpsc::channel(config.app.event_queue_capacity.max(1));
    let reader = match std::env::args().nth(1) {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open event file {}", path))?;
            tokio::spawn(read_events(BufReader::new(file), tx))
        }
        None => tokio::spawn(read_events(BufReader::new(tokio::io::stdin()), tx)),
    };

    let token = supervisor.start();
    let result = dispatcher.run(rx, token).await;
    supervisor.stop();

    // stdin 可能仍阻塞在读取上
    if !reader.is_finished() {
        reader.abort();
    }
    match reader.await {
        Ok(Ok(forwarded)) => tracing::info!(forwarded, "Event reader finished"),
        Ok(Err(e)) => tracing::error!("Event reader failed: {}", e),
        Err(e) if e.is_cancelled() => tracing::debug!("Event reader aborted"),
        Err(e) => tracing::error!("Event reader task panicked: {}", e),
    }

    let snapshot = stats.snapshot();
    tracing::info!(
        invoked = transport.invoked(),
        stats = %serde_json::to_string(&snapshot).unwrap_or_default(),
        "Final stats"
    );

    match result {
        Ok(()) => {
            shutdown.shutdown(ShutdownReason::InputClosed);
            tracing::info!(reason = ?shutdown.reason(), "Stopped");
            Ok(())
        }
        Err(e) => {
            shutdown.shutdown(ShutdownReason::TransportDisconnected(e.to_string()));
            for line in tail.recent(20) {
                eprintln!("{}", line);
            }
            Err(e).context("Dispatcher stopped")
        }
    }
}
