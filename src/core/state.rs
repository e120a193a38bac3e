//! 状态定义：AutomationState 与单次尝试上下文 AttemptContext
//!
//! AttemptContext 在检测到触发且没有进行中的尝试时创建，进入任一终态即销毁；
//! 每个会话同一时刻最多存在一个（single-flight）。

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::automation::guard::DedupMark;
use crate::automation::loop_guard::LoopGuard;
use crate::core::AutomationError;

/// 抢单状态机的阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum AutomationState {
    /// 已布防但尚未发出第一次点击（等待可用快照）
    Idle,
    AwaitingList,
    AwaitingDetails,
    /// 确认按钮已点击，等待远端应答
    AwaitingConfirmation,
    Completed,
    Failed,
    TimedOut,
}

impl AutomationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingList => "awaiting_list",
            Self::AwaitingDetails => "awaiting_details",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for AutomationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次抢单尝试的可变上下文
#[derive(Debug)]
pub struct AttemptContext {
    pub id: Uuid,
    pub state: AutomationState,
    pub started_at: Instant,
    /// 墙钟开始时间（仅用于报告）
    pub opened_at: DateTime<Utc>,
    /// 最近一次处理过的快照指纹（去重用）
    pub last_mark: Option<DedupMark>,
    /// 按选项文本统计的点击次数
    pub loop_guard: LoopGuard,
    /// 本次尝试中被远端确认的点击数
    pub invocations: u32,
}

impl AttemptContext {
    pub fn new(max_invocations_per_label: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: AutomationState::Idle,
            started_at: Instant::now(),
            opened_at: Utc::now(),
            last_mark: None,
            loop_guard: LoopGuard::new(max_invocations_per_label),
            invocations: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 是否已超出墙钟预算
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.elapsed() >= timeout
    }

    pub fn deadline(&self, timeout: Duration) -> Instant {
        self.started_at + timeout
    }
}

/// 尝试的终态结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Completed,
    Failed(AutomationError),
    TimedOut,
}

impl AttemptOutcome {
    pub fn state(&self) -> AutomationState {
        match self {
            Self::Completed => AutomationState::Completed,
            Self::Failed(_) => AutomationState::Failed,
            Self::TimedOut => AutomationState::TimedOut,
        }
    }
}

/// 尝试结束时输出的报告
#[derive(Clone, Debug)]
pub struct AttemptReport {
    pub attempt_id: Uuid,
    pub opened_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
    pub invocations: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(AutomationState::Completed.is_terminal());
        assert!(AutomationState::Failed.is_terminal());
        assert!(AutomationState::TimedOut.is_terminal());
        assert!(!AutomationState::Idle.is_terminal());
        assert!(!AutomationState::AwaitingConfirmation.is_terminal());
    }

    #[test]
    fn test_outcome_maps_to_state() {
        assert_eq!(AttemptOutcome::Completed.state(), AutomationState::Completed);
        assert_eq!(
            AttemptOutcome::Failed(AutomationError::NoEligibleOption).state(),
            AutomationState::Failed
        );
        assert_eq!(AttemptOutcome::TimedOut.state(), AutomationState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_context_expiry() {
        let ctx = AttemptContext::new(3);
        assert_eq!(ctx.state, AutomationState::Idle);
        assert!(!ctx.is_expired(Duration::from_secs(3)));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(ctx.is_expired(Duration::from_secs(3)));
    }
}
