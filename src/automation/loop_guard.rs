//! 循环保护：限制同一选项文本在一次尝试内被点击的次数
//!
//! 每次点击尝试都计数（成功与否都算），计数超过上限后本次尝试内不再点击该文本。

use std::collections::HashMap;

use crate::core::AutomationError;

#[derive(Debug, Clone)]
pub struct LoopGuard {
    max_per_label: u32,
    counts: HashMap<String, u32>,
}

impl LoopGuard {
    pub fn new(max_per_label: u32) -> Self {
        Self {
            max_per_label,
            counts: HashMap::new(),
        }
    }

    pub fn count(&self, label: &str) -> u32 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// 再点一次就会超过上限
    pub fn is_exhausted(&self, label: &str) -> bool {
        self.count(label) >= self.max_per_label
    }

    /// 登记一次点击尝试；超过上限时拒绝
    pub fn register(&mut self, label: &str) -> Result<u32, AutomationError> {
        let count = self.counts.entry(label.to_string()).or_insert(0);
        *count += 1;
        if *count > self.max_per_label {
            return Err(AutomationError::LoopDetected {
                label: label.to_string(),
                count: *count,
            });
        }
        Ok(*count)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }
}
