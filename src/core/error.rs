//! 抢单引擎错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AutomationError 决定 WaitForSnapshot / FailAttempt / TimeOutAttempt / Propagate。
//! 所有单次尝试内的错误只影响当前 AttemptContext，不影响会话连接本身。

use std::time::Duration;

use thiserror::Error;

/// 传输层（远端交互服务客户端）错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// 远端拒绝了回调（例如数据已失效）
    #[error("Invocation rejected: {0}")]
    Rejected(String),

    #[error("Invocation timed out after {0:?}")]
    Timeout(Duration),

    /// 键盘已被远端替换，回调令牌失效
    #[error("Keyboard is no longer valid")]
    StaleKeyboard,

    /// 连接断开：唯一需要上抛给监管层的错误
    #[error("Transport disconnected: {0}")]
    Disconnected(String),
}

/// 单次抢单尝试中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 快照超过年龄上限，等待更新的快照
    #[error("Snapshot is stale ({age:?} old)")]
    StaleSnapshot { age: Duration },

    /// 尚未观察到任何菜单
    #[error("No menu snapshot observed yet")]
    NoSnapshot,

    #[error("No eligible option in current menu")]
    NoEligibleOption,

    #[error("Loop detected: option '{label}' invoked {count} times")]
    LoopDetected { label: String, count: u32 },

    #[error("Attempt timed out after {0:?}")]
    AttemptTimeout(Duration),

    #[error("Config error: {0}")]
    Config(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 保持当前状态，等待下一次快照更新（受尝试超时约束）
    WaitForSnapshot,
    /// 当前尝试以 Failed 结束，不重试
    FailAttempt,
    /// 当前尝试以 TimedOut 结束
    TimeOutAttempt,
    /// 交给监管层处理（重连 / 重启）
    Propagate,
}
