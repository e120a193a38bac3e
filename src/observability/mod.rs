//! 可观测性：日志初始化、统计计数器、最近日志尾部

mod log_tail;
mod stats;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use log_tail::{LogTail, LogTailWriter};
pub use stats::{StatsCounters, StatsSnapshot};

/// 控制台输出 + 写入 LogTail；默认 info，可通过 RUST_LOG 覆盖
pub fn init(tail: &LogTail) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(tail.clone()))
        .try_init()
        .ok();
}
