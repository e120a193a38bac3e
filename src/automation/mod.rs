//! 抢单自动化：快照存储、触发检测、选项启发式、保护器、状态机与调度循环

pub mod dispatcher;
pub mod engine;
pub mod guard;
pub mod heuristics;
pub mod loop_guard;
pub mod matcher;
pub mod snapshot;
pub mod trigger;

pub use dispatcher::Dispatcher;
pub use engine::{AutomationEngine, StepResult};
pub use guard::{Admission, DedupGuard, DedupMark, Fingerprint};
pub use heuristics::{Decision, WaitReason};
pub use loop_guard::LoopGuard;
pub use matcher::{Matcher, SelectionRules};
pub use snapshot::{InvocationToken, Keyboard, MenuOption, MenuSnapshot, MessageId, SnapshotStore};
pub use trigger::TriggerDetector;
