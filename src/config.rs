//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AUTOBOOK__*` 覆盖（双下划线表示嵌套，如 `AUTOBOOK__AUTOMATION__ATTEMPT_TIMEOUT_MS=5000`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::AutomationError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub automation: AutomationSection,
}

/// [app] 段：进程名、远端发送者过滤、日志尾部容量
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 只处理来自该发送者的事件；未设置时全部接收
    pub tracked_sender: Option<i64>,
    #[serde(default = "default_log_tail_capacity")]
    pub log_tail_capacity: usize,
    /// 入站事件通道容量
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            tracked_sender: None,
            log_tail_capacity: default_log_tail_capacity(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

fn default_log_tail_capacity() -> usize {
    200
}

fn default_event_queue_capacity() -> usize {
    256
}

/// 首次点击的选项选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// 点击第一个可用选项
    #[default]
    FirstAvailable,
    /// 点击第一个命中 entry_keywords 的选项，找不到时退回第一个
    KeywordMatch,
    /// 依次点击所有选项
    InvokeAll,
}

/// [automation] 段：触发短语、选项启发式、时间窗口与循环上限
#[derive(Debug, Clone, Deserialize)]
pub struct AutomationSection {
    #[serde(default = "default_alert_phrase")]
    pub alert_phrase: String,
    #[serde(default = "default_confirmation_keywords")]
    pub confirmation_keywords: Vec<String>,
    #[serde(default = "default_confirmation_symbols")]
    pub confirmation_symbols: Vec<String>,
    #[serde(default = "default_list_marker_symbols")]
    pub list_marker_symbols: Vec<String>,
    /// 以数字开头的选项也视为列表项（如 "1024 Москва → Тула"）
    #[serde(default)]
    pub list_digit_prefix: bool,
    #[serde(default = "default_excluded_keywords")]
    pub excluded_keywords: Vec<String>,
    /// keyword-match 策略使用的关键字
    #[serde(default)]
    pub entry_keywords: Vec<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_staleness_ms")]
    pub staleness_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "default_max_invocation_attempts")]
    pub max_invocation_attempts: u32,
    #[serde(default)]
    pub selection_strategy: SelectionStrategy,
    #[serde(default = "default_invoke_all_delay_ms")]
    pub invoke_all_delay_ms: u64,
    /// 单次点击等待远端确认的上限
    #[serde(default = "default_invoke_timeout_ms")]
    pub invoke_timeout_ms: u64,
    /// 没有可用快照时发送的命令（请求新菜单）；None 表示只等待
    #[serde(default = "default_fallback_command")]
    pub fallback_command: Option<String>,
}

impl AutomationSection {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn staleness_ceiling(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.invoke_timeout_ms)
    }

    pub fn invoke_all_delay(&self) -> Duration {
        Duration::from_millis(self.invoke_all_delay_ms)
    }

    /// 拒绝会让状态机失去意义的组合
    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.max_invocation_attempts == 0 {
            return Err(AutomationError::Config(
                "max_invocation_attempts must be at least 1".into(),
            ));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(AutomationError::Config("attempt_timeout_ms must be positive".into()));
        }
        if self.debounce_ms >= self.attempt_timeout_ms {
            return Err(AutomationError::Config(format!(
                "debounce_ms ({}) must be shorter than attempt_timeout_ms ({})",
                self.debounce_ms, self.attempt_timeout_ms
            )));
        }
        if self.alert_phrase.trim().is_empty() {
            tracing::warn!("alert_phrase is empty, no message will start an attempt");
        }
        Ok(())
    }
}

impl Default for AutomationSection {
    fn default() -> Self {
        Self {
            alert_phrase: default_alert_phrase(),
            confirmation_keywords: default_confirmation_keywords(),
            confirmation_symbols: default_confirmation_symbols(),
            list_marker_symbols: default_list_marker_symbols(),
            list_digit_prefix: false,
            excluded_keywords: default_excluded_keywords(),
            entry_keywords: Vec::new(),
            debounce_ms: default_debounce_ms(),
            staleness_ms: default_staleness_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            max_invocation_attempts: default_max_invocation_attempts(),
            selection_strategy: SelectionStrategy::default(),
            invoke_all_delay_ms: default_invoke_all_delay_ms(),
            invoke_timeout_ms: default_invoke_timeout_ms(),
            fallback_command: default_fallback_command(),
        }
    }
}

fn default_alert_phrase() -> String {
    "Появились новые перевозки".to_string()
}

fn default_confirmation_keywords() -> Vec<String> {
    vec![
        // 只放长词，短词容易误中导航按钮
        "подтвердить".into(),
        "подтверждаю".into(),
        "подтверждение".into(),
        "забронировать".into(),
        "бронировать".into(),
        "бронирую".into(),
        "бронирование".into(),
        "взять перевозку".into(),
        "беру".into(),
        "взял".into(),
        "оформить".into(),
        "оформляю".into(),
        "оформление".into(),
        "занять".into(),
        "занимаю".into(),
        "согласен".into(),
        "confirm".into(),
        "book".into(),
        "accept".into(),
    ]
}

fn default_confirmation_symbols() -> Vec<String> {
    vec!["✅".into(), "✔️".into(), "👍".into(), "✓".into()]
}

fn default_list_marker_symbols() -> Vec<String> {
    vec!["🚛".into(), "🚚".into()]
}

fn default_excluded_keywords() -> Vec<String> {
    vec![
        "список".into(),
        "меню".into(),
        "настройки".into(),
        "возврат".into(),
        "назад".into(),
        "menu".into(),
        "back".into(),
    ]
}

fn default_debounce_ms() -> u64 {
    150
}

fn default_staleness_ms() -> u64 {
    2000
}

fn default_attempt_timeout_ms() -> u64 {
    3000
}

fn default_max_invocation_attempts() -> u32 {
    3
}

fn default_invoke_all_delay_ms() -> u64 {
    100
}

fn default_invoke_timeout_ms() -> u64 {
    1500
}

fn default_fallback_command() -> Option<String> {
    Some("/start".to_string())
}

/// 从 config 目录加载配置，环境变量 AUTOBOOK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AUTOBOOK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AUTOBOOK")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
