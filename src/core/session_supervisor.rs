//! 会话监管：生命周期（start / stop 钩子）
//!
//! 持有 CancellationToken，stop 时取消调度循环；每次 start 派生新的子 token，
//! 因此 stop 之后可以重新 start。

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// 会话级生命周期管理
#[derive(Debug)]
pub struct SessionSupervisor {
    /// 进程级关闭时触发
    root_token: CancellationToken,
    /// 当前运行中的调度循环 token
    current: Mutex<Option<CancellationToken>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::with_parent(CancellationToken::new())
    }

    /// 挂到外部（如 ShutdownManager）的 token 之下
    pub fn with_parent(root_token: CancellationToken) -> Self {
        Self {
            root_token,
            current: Mutex::new(None),
        }
    }

    /// 启动钩子：返回调度循环使用的 token；已在运行时返回同一个
    pub fn start(&self) -> CancellationToken {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = current.as_ref().filter(|t| !t.is_cancelled()) {
            return token.clone();
        }
        let token = self.root_token.child_token();
        *current = Some(token.clone());
        tracing::info!("Session started");
        token
    }

    /// 停止钩子：取消当前调度循环
    pub fn stop(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = current.take() {
            token.cancel();
            tracing::info!("Session stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop_restart() {
        let supervisor = SessionSupervisor::new();
        assert!(!supervisor.is_running());

        let first = supervisor.start();
        assert!(supervisor.is_running());
        // 重复 start 返回同一个 token
        let again = supervisor.start();
        supervisor.stop();
        assert!(first.is_cancelled());
        assert!(again.is_cancelled());
        assert!(!supervisor.is_running());

        let second = supervisor.start();
        assert!(!second.is_cancelled());
        assert!(supervisor.is_running());
    }

    #[test]
    fn test_parent_cancel_stops_session() {
        let root = CancellationToken::new();
        let supervisor = SessionSupervisor::with_parent(root.clone());
        let token = supervisor.start();
        root.cancel();
        assert!(token.is_cancelled());
        assert!(!supervisor.is_running());
    }
}
