//! 选项匹配器：数据驱动的谓词，按固定优先级求值
//!
//! 所有启发式（确认按钮、列表标记、导航排除、首次点击关键字）都由配置生成的
//! `Matcher` 列表表达，测试可以直接替换选项集合而不必改动引擎逻辑。
//!
//! 列表判定规则只有一条：选项文本包含任一列表标记符号即为列表项；
//! 开启 `list_digit_prefix` 时，以数字开头的选项也算。

use std::sync::OnceLock;

use regex::Regex;

use crate::automation::snapshot::MenuOption;
use crate::config::AutomationSection;

fn leading_digit_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d").ok()).as_ref()
}

/// 单个匹配谓词
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// 去掉首尾空白后与关键字完全相同（忽略大小写）
    ExactLabel(String),
    /// 包含关键字（忽略大小写）
    SubstringKeyword(String),
    /// 包含符号（如 ✅、🚛）
    SymbolPresence(String),
    /// 以数字开头
    LeadingDigit,
}

impl Matcher {
    pub fn matches(&self, label: &str) -> bool {
        match self {
            Self::ExactLabel(keyword) => label.trim().to_lowercase() == keyword.trim().to_lowercase(),
            Self::SubstringKeyword(keyword) => {
                !keyword.is_empty() && label.to_lowercase().contains(&keyword.to_lowercase())
            }
            Self::SymbolPresence(symbol) => !symbol.is_empty() && label.contains(symbol.as_str()),
            Self::LeadingDigit => leading_digit_re().is_some_and(|re| re.is_match(label)),
        }
    }
}

/// 任一匹配器命中即返回 true
pub fn any_match(matchers: &[Matcher], label: &str) -> bool {
    matchers.iter().any(|m| m.matches(label))
}

/// 按匹配器优先级查找第一个命中的选项：先遍历匹配器，再按位置遍历选项。
/// `eligible` 用于跳过已被循环保护拒绝的选项。
pub fn first_match<'a, I, F>(
    matchers: &'a [Matcher],
    options: I,
    eligible: F,
) -> Option<(&'a Matcher, &'a MenuOption)>
where
    I: IntoIterator<Item = &'a MenuOption>,
    F: Fn(&MenuOption) -> bool,
{
    let options: Vec<&MenuOption> = options.into_iter().collect();
    matchers.iter().find_map(|matcher| {
        options
            .iter()
            .find(|o| eligible(o) && matcher.matches(&o.label))
            .map(|o| (matcher, *o))
    })
}

/// 由配置生成的全部启发式规则
#[derive(Debug, Clone, Default)]
pub struct SelectionRules {
    /// 确认按钮：精确关键字 > 确认符号 > 关键字子串
    pub confirmation: Vec<Matcher>,
    pub list_markers: Vec<Matcher>,
    /// 兜底步骤禁止选择的导航/菜单按钮
    pub excluded: Vec<Matcher>,
    /// keyword-match 策略的首次点击关键字
    pub entry: Vec<Matcher>,
}

impl SelectionRules {
    pub fn from_config(cfg: &AutomationSection) -> Self {
        let mut confirmation: Vec<Matcher> = cfg
            .confirmation_keywords
            .iter()
            .map(|k| Matcher::ExactLabel(k.clone()))
            .collect();
        confirmation.extend(
            cfg.confirmation_symbols
                .iter()
                .map(|s| Matcher::SymbolPresence(s.clone())),
        );
        confirmation.extend(
            cfg.confirmation_keywords
                .iter()
                .map(|k| Matcher::SubstringKeyword(k.clone())),
        );

        let mut list_markers: Vec<Matcher> = cfg
            .list_marker_symbols
            .iter()
            .map(|s| Matcher::SymbolPresence(s.clone()))
            .collect();
        if cfg.list_digit_prefix {
            list_markers.push(Matcher::LeadingDigit);
        }

        Self {
            confirmation,
            list_markers,
            excluded: cfg
                .excluded_keywords
                .iter()
                .map(|k| Matcher::SubstringKeyword(k.clone()))
                .collect(),
            entry: cfg
                .entry_keywords
                .iter()
                .map(|k| Matcher::SubstringKeyword(k.clone()))
                .collect(),
        }
    }

    pub fn is_list_option(&self, label: &str) -> bool {
        any_match(&self.list_markers, label)
    }

    pub fn is_excluded(&self, label: &str) -> bool {
        any_match(&self.excluded, label)
    }
}
