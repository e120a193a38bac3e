//! 错误恢复引擎
//!
//! 根据 AutomationError 类型返回 RecoveryAction，供状态机决定是等待、失败、超时还是上抛。

use crate::core::{AutomationError, RecoveryAction, TransportError};

/// 把错误映射为可执行动作（等待快照 / 失败 / 超时 / 上抛）
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AutomationError) -> RecoveryAction {
        match err {
            // 断线不属于单次尝试，交给监管层
            AutomationError::Transport(TransportError::Disconnected(_)) => RecoveryAction::Propagate,
            // 点击失败不立即重试，等远端下一次编辑
            AutomationError::Transport(_) => RecoveryAction::WaitForSnapshot,
            AutomationError::StaleSnapshot { .. } => RecoveryAction::WaitForSnapshot,
            AutomationError::NoSnapshot => RecoveryAction::WaitForSnapshot,
            AutomationError::NoEligibleOption => RecoveryAction::FailAttempt,
            AutomationError::LoopDetected { .. } => RecoveryAction::FailAttempt,
            AutomationError::AttemptTimeout(_) => RecoveryAction::TimeOutAttempt,
            AutomationError::Config(_) => RecoveryAction::Propagate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_recovery_transport_failure_waits() {
        let engine = RecoveryEngine::new();
        let err = AutomationError::Transport(TransportError::Rejected("DATA_INVALID".into()));
        assert_eq!(engine.handle(&err), RecoveryAction::WaitForSnapshot);

        let err = AutomationError::Transport(TransportError::Timeout(Duration::from_millis(500)));
        assert_eq!(engine.handle(&err), RecoveryAction::WaitForSnapshot);
    }

    #[test]
    fn test_recovery_disconnect_propagates() {
        let engine = RecoveryEngine::new();
        let err = AutomationError::from(TransportError::Disconnected("socket closed".into()));
        assert_eq!(engine.handle(&err), RecoveryAction::Propagate);
    }

    #[test]
    fn test_recovery_stale_snapshot_waits() {
        let engine = RecoveryEngine::new();
        let err = AutomationError::StaleSnapshot {
            age: Duration::from_secs(3),
        };
        assert_eq!(engine.handle(&err), RecoveryAction::WaitForSnapshot);
    }

    #[test]
    fn test_recovery_terminal_errors() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&AutomationError::NoEligibleOption),
            RecoveryAction::FailAttempt
        );
        let looped = AutomationError::LoopDetected {
            label: "🚛 1024".into(),
            count: 4,
        };
        assert_eq!(engine.handle(&looped), RecoveryAction::FailAttempt);
        assert_eq!(
            engine.handle(&AutomationError::AttemptTimeout(Duration::from_secs(3))),
            RecoveryAction::TimeOutAttempt
        );
    }
}
