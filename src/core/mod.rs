//! 核心层：错误与恢复、状态定义、会话监管、优雅关闭

pub mod error;
pub mod recovery;
pub mod session_supervisor;
pub mod shutdown;
pub mod state;

pub use error::{AutomationError, RecoveryAction, TransportError};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{AttemptContext, AttemptOutcome, AttemptReport, AutomationState};
