//! Autobook - Rust 自动抢单引擎
//!
//! 模块划分：
//! - **automation**: 快照存储、触发检测、选项启发式、去重 / 循环保护、状态机与调度循环
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、状态、会话监管、优雅关闭
//! - **observability**: 日志初始化、统计计数器、最近日志尾部
//! - **transport**: 远端交互服务抽象（Mock / JSONL 回放）

pub mod automation;
pub mod config;
pub mod core;
pub mod observability;
pub mod transport;

pub use automation::{AutomationEngine, Dispatcher};
