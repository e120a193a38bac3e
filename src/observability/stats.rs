//! 统计计数器：进程级、单调递增，仅在重启时归零

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug)]
pub struct StatsCounters {
    triggers: AtomicU64,
    /// 被远端确认的点击
    invocations: AtomicU64,
    /// 以 Completed 结束的尝试
    successes: AtomicU64,
    /// 以 Failed / TimedOut 结束的尝试
    failures: AtomicU64,
    /// 传输层错误
    errors: AtomicU64,
    started_at: Instant,
}

/// 供运维层读取的时点快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub triggers: u64,
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub errors: u64,
    pub uptime_seconds: u64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self {
            triggers: AtomicU64::new(0),
            invocations: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_trigger(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            triggers: self.triggers.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for StatsCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reflects_counters_and_uptime() {
        let stats = StatsCounters::new();
        stats.record_trigger();
        stats.record_invocation();
        stats.record_invocation();
        stats.record_success();
        stats.record_error();
        tokio::time::advance(Duration::from_secs(61)).await;

        let snap = stats.snapshot();
        assert_eq!(snap.triggers, 1);
        assert_eq!(snap.invocations, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 0);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.uptime_seconds, 61);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_value(StatsCounters::new().snapshot()).unwrap();
        assert!(json.get("uptimeSeconds").is_some());
        assert_eq!(json["triggers"], 0);
    }
}
