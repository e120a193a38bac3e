//! 抢单状态机
//!
//! 每个会话一个 `AutomationEngine`：独占自己的快照存储与尝试上下文，没有进程级单例。
//! 所有迁移都经由 `&mut self` 串行执行；点击等待远端应答期间到达的事件由调度器排队，
//! 当前迁移完成后才会被处理。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Instant;
use uuid::Uuid;

use crate::automation::guard::{Admission, DedupGuard};
use crate::automation::heuristics::{self, Decision};
use crate::automation::matcher::SelectionRules;
use crate::automation::snapshot::{InvocationToken, MenuOption, MenuSnapshot, MessageId, SnapshotStore};
use crate::automation::trigger::TriggerDetector;
use crate::config::AutomationSection;
use crate::core::{
    AttemptContext, AttemptOutcome, AttemptReport, AutomationError, AutomationState, RecoveryAction,
    RecoveryEngine, TransportError,
};
use crate::observability::{StatsCounters, StatsSnapshot};
use crate::transport::{InboundEvent, Transport};

/// 一次处理的结果：尝试进入终态时带回报告；Err 只出现在需要上抛给监管层的错误上
pub type StepResult = Result<Option<AttemptReport>, AutomationError>;

pub struct AutomationEngine {
    config: AutomationSection,
    transport: Arc<dyn Transport>,
    store: SnapshotStore,
    trigger: TriggerDetector,
    rules: SelectionRules,
    guard: DedupGuard,
    recovery: RecoveryEngine,
    /// single-flight 标志
    active: AtomicBool,
    attempt: Option<AttemptContext>,
    stats: Arc<StatsCounters>,
}

impl AutomationEngine {
    pub fn new(config: AutomationSection, transport: Arc<dyn Transport>, stats: Arc<StatsCounters>) -> Self {
        Self {
            trigger: TriggerDetector::new(config.alert_phrase.clone()),
            rules: SelectionRules::from_config(&config),
            guard: DedupGuard::new(config.debounce_window(), config.staleness_ceiling()),
            recovery: RecoveryEngine::new(),
            store: SnapshotStore::new(),
            active: AtomicBool::new(false),
            attempt: None,
            transport,
            stats,
            config,
        }
    }

    /// 当前状态；没有进行中的尝试时为 Idle
    pub fn state(&self) -> AutomationState {
        self.attempt.as_ref().map_or(AutomationState::Idle, |ctx| ctx.state)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn attempt(&self) -> Option<&AttemptContext> {
        self.attempt.as_ref()
    }

    fn attempt_id(&self) -> Option<Uuid> {
        self.attempt.as_ref().map(|ctx| ctx.id)
    }

    /// 当前尝试的墙钟截止时间
    pub fn deadline(&self) -> Option<Instant> {
        self.attempt
            .as_ref()
            .map(|ctx| ctx.deadline(self.config.attempt_timeout()))
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 事件携带键盘时更新快照存储（到达即更新，不等去抖）
    pub fn observe(&self, event: &InboundEvent) -> Option<Arc<MenuSnapshot>> {
        event
            .options
            .as_ref()
            .map(|keyboard| self.store.update(event.message_id, keyboard.clone()))
    }

    /// 文本含提醒短语
    pub fn is_trigger(&self, text: &str) -> bool {
        self.trigger.classify(text)
    }

    /// 立即处理一条事件：先更新快照，再判断触发；触发被忽略或没有触发时，带键盘就推进状态机
    pub async fn process(&mut self, event: &InboundEvent) -> StepResult {
        self.observe(event);
        if self.trigger.classify(&event.text) {
            if let Some(report) = self.check_timeout()? {
                tracing::debug!(attempt_id = %report.attempt_id, "Expired attempt closed before new trigger");
            }
            if !self.is_active() {
                return self.on_trigger().await;
            }
            tracing::warn!(attempt_id = ?self.attempt_id(), state = %self.state(), "Trigger ignored: attempt already active");
        }
        if event.options.is_some() {
            return self.step().await;
        }
        Ok(None)
    }

    /// 检测到触发：没有进行中的尝试时开始新尝试
    pub async fn on_trigger(&mut self) -> StepResult {
        self.check_timeout()?;
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(attempt_id = ?self.attempt_id(), state = %self.state(), "Trigger ignored: attempt already active");
            return Ok(None);
        }

        self.stats.record_trigger();
        let ctx = AttemptContext::new(self.config.max_invocation_attempts);
        tracing::info!(attempt_id = %ctx.id, "Trigger detected, attempt started");
        self.attempt = Some(ctx);

        let ceiling = self.config.staleness_ceiling();
        let usable = self.store.read().filter(|snapshot| !snapshot.is_stale(ceiling));
        if usable.is_none() {
            return self.request_menu().await;
        }
        self.step().await
    }

    /// 没有可用快照：发送兜底命令请求新菜单，尝试保持 Idle 等待第一个新快照
    async fn request_menu(&mut self) -> StepResult {
        let command = self
            .config
            .fallback_command
            .clone()
            .filter(|command| !command.is_empty());
        let Some(command) = command else {
            tracing::info!(attempt_id = ?self.attempt_id(), "No usable snapshot, waiting for the menu");
            return Ok(None);
        };

        tracing::info!(attempt_id = ?self.attempt_id(), command = %command, "No usable snapshot, requesting a fresh menu");
        match self.transport.send_text(&command).await {
            Ok(()) => Ok(None),
            Err(err) => self.on_transport_error(err),
        }
    }

    /// 在最新快照上推进当前尝试
    pub async fn step(&mut self) -> StepResult {
        if self.attempt.is_none() {
            return Ok(None);
        }
        if let Some(report) = self.check_timeout()? {
            return Ok(Some(report));
        }

        loop {
            let Some(snapshot) = self.store.read() else {
                return self.handle_error(AutomationError::NoSnapshot);
            };
            let Some(ctx) = self.attempt.as_mut() else {
                return Ok(None);
            };
            let state = ctx.state;

            // 标记在点击之前写回
            match self.guard.admit(&snapshot, state, ctx.last_mark.as_ref()) {
                Admission::Proceed(mark) => ctx.last_mark = Some(mark),
                Admission::Duplicate => {
                    tracing::debug!(attempt_id = %ctx.id, state = %state, revision = snapshot.revision, "Duplicate snapshot skipped");
                    return Ok(None);
                }
                Admission::Stale(err) => return self.handle_error(err),
            }

            let decision = match state {
                AutomationState::Idle => heuristics::decide_entry(
                    self.config.selection_strategy,
                    &self.rules,
                    &snapshot,
                    &ctx.loop_guard,
                ),
                AutomationState::AwaitingList => heuristics::decide_list(&self.rules, &snapshot, &ctx.loop_guard),
                AutomationState::AwaitingDetails => {
                    heuristics::decide_details(&self.rules, &snapshot, &ctx.loop_guard)
                }
                // 确认点击在途，或已是终态
                _ => return Ok(None),
            };

            match decision {
                Decision::Wait(reason) => {
                    tracing::debug!(attempt_id = %ctx.id, state = %state, ?reason, "Waiting for the next snapshot");
                    return Ok(None);
                }
                Decision::Advance(next) => {
                    tracing::info!(attempt_id = %ctx.id, from = %state, to = %next, "List markers gone");
                    ctx.state = next;
                    // 同一快照在新状态下重新判定
                }
                Decision::Fail(err) => return self.handle_error(err),
                Decision::Invoke { option, next, reason } => {
                    return self.invoke_option(snapshot.message_id, option, next, reason).await;
                }
                Decision::InvokeAll { options, next } => {
                    return self.invoke_all(snapshot.message_id, options, next).await;
                }
            }
        }
    }

    async fn invoke_option(
        &mut self,
        message_id: MessageId,
        option: MenuOption,
        next: AutomationState,
        reason: &'static str,
    ) -> StepResult {
        let Some(ctx) = self.attempt.as_mut() else {
            return Ok(None);
        };
        if let Err(err) = ctx.loop_guard.register(&option.label) {
            return self.handle_error(err);
        }
        let resume = ctx.state;
        if next == AutomationState::Completed {
            ctx.state = AutomationState::AwaitingConfirmation;
        }
        tracing::info!(
            attempt_id = %ctx.id,
            message_id,
            state = %resume,
            label = %option.label,
            reason,
            "Invoking option"
        );

        match self.invoke_bounded(message_id, &option.token).await {
            Ok(()) => {
                self.stats.record_invocation();
                if let Some(ctx) = self.attempt.as_mut() {
                    ctx.invocations += 1;
                    if next != AutomationState::Completed {
                        tracing::info!(attempt_id = %ctx.id, from = %resume, to = %next, "Invocation acknowledged");
                        ctx.state = next;
                    }
                }
                if next == AutomationState::Completed {
                    return Ok(self.finish(AttemptOutcome::Completed));
                }
                Ok(None)
            }
            Err(err) => {
                if let Some(ctx) = self.attempt.as_mut() {
                    ctx.state = resume;
                }
                self.on_transport_error(err)
            }
        }
    }

    /// invoke-all：依次点击，相邻两次之间暂停；至少一次被确认才迁移
    async fn invoke_all(&mut self, message_id: MessageId, options: Vec<MenuOption>, next: AutomationState) -> StepResult {
        let delay = self.config.invoke_all_delay();
        let timeout = self.config.attempt_timeout();
        let mut acknowledged = 0u32;

        for (index, option) in options.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(delay).await;
            }
            let Some(ctx) = self.attempt.as_mut() else {
                return Ok(None);
            };
            if ctx.is_expired(timeout) {
                break;
            }
            if let Err(err) = ctx.loop_guard.register(&option.label) {
                tracing::warn!(attempt_id = %ctx.id, error = %err, "Skipping option");
                continue;
            }
            tracing::info!(attempt_id = %ctx.id, message_id, label = %option.label, index, "Invoking option (invoke-all)");

            match self.invoke_bounded(message_id, &option.token).await {
                Ok(()) => {
                    self.stats.record_invocation();
                    acknowledged += 1;
                    if let Some(ctx) = self.attempt.as_mut() {
                        ctx.invocations += 1;
                    }
                }
                Err(err) => {
                    self.on_transport_error(err)?;
                }
            }
        }

        if let Some(report) = self.check_timeout()? {
            return Ok(Some(report));
        }
        if acknowledged > 0 {
            if let Some(ctx) = self.attempt.as_mut() {
                tracing::info!(attempt_id = %ctx.id, acknowledged, to = %next, "Invoke-all finished");
                ctx.state = next;
            }
        }
        Ok(None)
    }

    /// 单次点击受 invoke_timeout 约束
    async fn invoke_bounded(&self, message_id: MessageId, token: &InvocationToken) -> Result<(), TransportError> {
        let limit = self.config.invoke_timeout();
        match tokio::time::timeout(limit, self.transport.invoke(message_id, token)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(limit)),
        }
    }

    fn on_transport_error(&mut self, err: TransportError) -> StepResult {
        self.stats.record_error();
        tracing::warn!(attempt_id = ?self.attempt_id(), error = %err, "Transport call failed");
        self.handle_error(err.into())
    }

    fn handle_error(&mut self, err: AutomationError) -> StepResult {
        match self.recovery.handle(&err) {
            RecoveryAction::WaitForSnapshot => {
                tracing::debug!(attempt_id = ?self.attempt_id(), error = %err, "Waiting for the next snapshot");
                Ok(None)
            }
            RecoveryAction::FailAttempt => Ok(self.finish(AttemptOutcome::Failed(err))),
            RecoveryAction::TimeOutAttempt => Ok(self.finish(AttemptOutcome::TimedOut)),
            RecoveryAction::Propagate => {
                self.finish(AttemptOutcome::Failed(err.clone()));
                Err(err)
            }
        }
    }

    /// 超出墙钟预算时无条件放弃当前尝试（已发出的点击无法撤回）
    pub fn check_timeout(&mut self) -> StepResult {
        let timeout = self.config.attempt_timeout();
        let expired = self.attempt.as_ref().is_some_and(|ctx| ctx.is_expired(timeout));
        if !expired {
            return Ok(None);
        }
        self.handle_error(AutomationError::AttemptTimeout(timeout))
    }

    fn finish(&mut self, outcome: AttemptOutcome) -> Option<AttemptReport> {
        let ctx = self.attempt.take()?;
        match outcome {
            AttemptOutcome::Completed => self.stats.record_success(),
            AttemptOutcome::Failed(_) | AttemptOutcome::TimedOut => self.stats.record_failure(),
        }
        self.active.store(false, Ordering::Release);

        let report = AttemptReport {
            attempt_id: ctx.id,
            opened_at: ctx.opened_at,
            outcome,
            elapsed: ctx.elapsed(),
            invocations: ctx.invocations,
        };
        let elapsed_ms = report.elapsed.as_millis() as u64;
        match &report.outcome {
            AttemptOutcome::Completed => {
                tracing::info!(attempt_id = %report.attempt_id, opened_at = %report.opened_at.to_rfc3339(), elapsed_ms, invocations = report.invocations, "Attempt completed")
            }
            AttemptOutcome::Failed(err) => {
                tracing::warn!(attempt_id = %report.attempt_id, elapsed_ms, invocations = report.invocations, error = %err, "Attempt failed")
            }
            AttemptOutcome::TimedOut => {
                tracing::warn!(attempt_id = %report.attempt_id, elapsed_ms, invocations = report.invocations, "Attempt timed out")
            }
        }

        let stats = self.stats.snapshot();
        tracing::info!(
            triggers = stats.triggers,
            invocations = stats.invocations,
            successes = stats.successes,
            failures = stats.failures,
            errors = stats.errors,
            "Stats"
        );
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::automation::snapshot::Keyboard;
    use crate::config::SelectionStrategy;
    use crate::transport::MockTransport;

    const BOT: i64 = 42;

    fn engine_with(config: AutomationSection, transport: Arc<MockTransport>) -> AutomationEngine {
        AutomationEngine::new(config, transport, Arc::new(StatsCounters::new()))
    }

    fn alert() -> InboundEvent {
        InboundEvent::message(1, BOT, "⚡ Появились новые перевозки")
    }

    fn menu(message_id: MessageId, labels: &[&str]) -> InboundEvent {
        InboundEvent::edit(message_id, BOT, "")
            .with_keyboard(Keyboard::single_column(labels.iter().copied()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_without_snapshot_requests_menu() {
        let mock = Arc::new(MockTransport::new());
        let mut engine = engine_with(AutomationSection::default(), mock.clone());

        assert!(engine.process(&alert()).await.unwrap().is_none());
        assert_eq!(mock.sent_texts(), vec!["/start"]);
        assert!(mock.invocations().is_empty());
        assert!(engine.is_active());
        assert_eq!(engine.state(), AutomationState::Idle);

        // 第一个新菜单到达后才做入口点击
        engine.process(&menu(2, &["📋 Список перевозок", "⚙️ Настройки"])).await.unwrap();
        assert_eq!(mock.invoked_tokens(), vec!["cb:0"]);
        assert_eq!(engine.state(), AutomationState::AwaitingList);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_fallback_command_only_waits() {
        let mock = Arc::new(MockTransport::new());
        let mut config = AutomationSection::default();
        config.fallback_command = Some(String::new());
        let mut engine = engine_with(config, mock.clone());

        engine.process(&alert()).await.unwrap();
        assert!(mock.sent_texts().is_empty());
        assert!(engine.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_waits_for_next_snapshot() {
        let mock = Arc::new(MockTransport::new());
        let mut engine = engine_with(AutomationSection::default(), mock.clone());

        engine.process(&alert().with_keyboard(Keyboard::single_column(["🚛 1024"]))).await.unwrap();
        assert_eq!(engine.state(), AutomationState::AwaitingList);

        mock.fail_next(TransportError::Rejected("MESSAGE_ID_INVALID".into()));
        let report = engine.process(&menu(1, &["Подтвердить", "Назад"])).await.unwrap();
        assert!(report.is_none());
        assert_eq!(engine.state(), AutomationState::AwaitingDetails);
        assert_eq!(engine.stats().errors, 1);
        assert_eq!(engine.stats().invocations, 1);

        tokio::time::advance(Duration::from_millis(200)).await;
        let report = engine.process(&menu(1, &["Подтвердить", "Назад"])).await.unwrap().unwrap();
        assert_eq!(report.outcome, AttemptOutcome::Completed);
        assert_eq!(report.invocations, 2);
        assert_eq!(mock.invoked_tokens(), vec!["cb:0", "cb:0", "cb:0"]);
        assert!(!engine.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_propagates_and_ends_attempt() {
        let mock = Arc::new(MockTransport::new());
        let mut engine = engine_with(AutomationSection::default(), mock.clone());
        mock.fail_next(TransportError::Disconnected("socket closed".into()));

        let err = engine
            .process(&alert().with_keyboard(Keyboard::single_column(["🚛 1"])))
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::Transport(TransportError::Disconnected(_))));
        assert!(!engine.is_active());
        assert_eq!(engine.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_timeout_counts_as_error() {
        let mock = Arc::new(MockTransport::with_latency(Duration::from_secs(5)));
        let mut engine = engine_with(AutomationSection::default(), mock.clone());

        engine.process(&alert().with_keyboard(Keyboard::single_column(["🚛 1"]))).await.unwrap();
        let stats = engine.stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.invocations, 0);
        assert_eq!(engine.state(), AutomationState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_all_strategy() {
        let mock = Arc::new(MockTransport::new());
        let mut config = AutomationSection::default();
        config.selection_strategy = SelectionStrategy::InvokeAll;
        let mut engine = engine_with(config, mock.clone());

        engine.process(&alert().with_keyboard(Keyboard::single_column(["A", "B", "C"]))).await.unwrap();
        assert_eq!(mock.invoked_tokens(), vec!["cb:0", "cb:1", "cb:2"]);
        assert_eq!(engine.state(), AutomationState::AwaitingList);
        assert_eq!(engine.attempt().unwrap().invocations, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_trigger_is_single_flight() {
        let mock = Arc::new(MockTransport::new());
        let mut engine = engine_with(AutomationSection::default(), mock.clone());

        engine.process(&alert()).await.unwrap();
        let first = engine.attempt().unwrap().id;
        engine.process(&alert()).await.unwrap();

        assert_eq!(engine.attempt().unwrap().id, first);
        assert_eq!(engine.stats().triggers, 1);
        assert_eq!(mock.sent_texts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_attempt_is_replaced_by_new_trigger() {
        let mock = Arc::new(MockTransport::new());
        let mut engine = engine_with(AutomationSection::default(), mock.clone());

        engine.process(&alert()).await.unwrap();
        let first = engine.attempt().unwrap().id;
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(engine.deadline().unwrap() <= Instant::now());

        engine.process(&alert()).await.unwrap();
        assert_ne!(engine.attempt().unwrap().id, first);
        let stats = engine.stats();
        assert_eq!(stats.triggers, 2);
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_timeout_reports_timed_out() {
        let mock = Arc::new(MockTransport::new());
        let mut engine = engine_with(AutomationSection::default(), mock.clone());

        engine.process(&alert()).await.unwrap();
        assert!(engine.check_timeout().unwrap().is_none());

        tokio::time::advance(Duration::from_secs(3)).await;
        let report = engine.check_timeout().unwrap().expect("attempt should expire");
        assert_eq!(report.outcome, AttemptOutcome::TimedOut);
        assert!(!engine.is_active());
        assert_eq!(engine.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_trigger_still_steps_on_keyboard() {
        let mock = Arc::new(MockTransport::new());
        let mut engine = engine_with(AutomationSection::default(), mock.clone());

        engine.process(&alert().with_keyboard(Keyboard::single_column(["🚛 7"]))).await.unwrap();
        let first = engine.attempt().unwrap().id;
        assert_eq!(engine.state(), AutomationState::AwaitingList);

        // 第二条提醒带着详情键盘到达：不开新尝试，但键盘照常推进
        let report = engine
            .process(&alert().with_keyboard(Keyboard::single_column(["Подтвердить", "Назад"])))
            .await
            .unwrap()
            .expect("confirmation should finish the attempt");
        assert_eq!(report.attempt_id, first);
        assert_eq!(report.outcome, AttemptOutcome::Completed);
        assert_eq!(engine.stats().triggers, 1);
        assert_eq!(mock.invoked_tokens(), vec!["cb:0", "cb:0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyboard_without_attempt_only_updates_store() {
        let mock = Arc::new(MockTransport::new());
        let mut engine = engine_with(AutomationSection::default(), mock.clone());

        engine.process(&menu(9, &["Подтвердить"])).await.unwrap();
        assert!(mock.invocations().is_empty());
        assert_eq!(engine.store().read().unwrap().message_id, 9);
    }
}
