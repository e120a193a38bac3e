//! 触发检测：入站文本是否包含配置的提醒短语（区分大小写的子串匹配，无状态）

#[derive(Debug, Clone)]
pub struct TriggerDetector {
    alert_phrase: String,
}

impl TriggerDetector {
    pub fn new(alert_phrase: impl Into<String>) -> Self {
        Self {
            alert_phrase: alert_phrase.into(),
        }
    }

    pub fn classify(&self, text: &str) -> bool {
        // 空短语会命中所有消息
        !self.alert_phrase.is_empty() && text.contains(&self.alert_phrase)
    }

    pub fn alert_phrase(&self) -> &str {
        &self.alert_phrase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_substring() {
        let detector = TriggerDetector::new("Появились новые перевозки");
        assert!(detector.classify("🔔 Появились новые перевозки! Успейте забронировать"));
        assert!(!detector.classify("Новых перевозок нет"));
    }

    #[test]
    fn test_classify_is_case_sensitive() {
        let detector = TriggerDetector::new("New loads");
        assert!(detector.classify("New loads available"));
        assert!(!detector.classify("new loads available"));
    }

    #[test]
    fn test_empty_phrase_never_triggers() {
        let detector = TriggerDetector::new("");
        assert!(!detector.classify("anything"));
    }
}
