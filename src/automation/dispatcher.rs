//! 单一调度循环
//!
//! 新消息与编辑都从同一个通道进入，由这一个循环串行交给引擎，不存在两个处理器互相重入。
//! - 新消息：立即处理
//! - 编辑：到达即更新快照，然后取消并重启去抖计时；计时到期时只对最新快照动作
//! - 带提醒短语的编辑与新消息一样立即开始尝试
//! - 尝试截止时间到达时立即以 TimedOut 结束，不必等下一条事件

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::automation::engine::{AutomationEngine, StepResult};
use crate::core::{AttemptReport, AutomationError};
use crate::transport::{InboundEvent, SenderFilter};

pub struct Dispatcher {
    engine: AutomationEngine,
    filter: SenderFilter,
    debounce: Duration,
    last_report: Option<AttemptReport>,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Dispatcher {
    pub fn new(engine: AutomationEngine, filter: SenderFilter, debounce: Duration) -> Self {
        Self {
            engine,
            filter,
            debounce,
            last_report: None,
        }
    }

    pub fn engine(&self) -> &AutomationEngine {
        &self.engine
    }

    pub fn into_engine(self) -> AutomationEngine {
        self.engine
    }

    /// 最近一次结束的尝试
    pub fn last_report(&self) -> Option<&AttemptReport> {
        self.last_report.as_ref()
    }

    fn record(&mut self, result: StepResult) -> Result<(), AutomationError> {
        if let Some(report) = check(result)? {
            self.last_report = Some(report);
        }
        Ok(())
    }

    /// 运行到取消、或输入关闭且没有待处理的编辑与进行中的尝试为止。
    /// 只有传输断开会以 Err 返回。
    pub async fn run(
        &mut self,
        mut rx: mpsc::Receiver<InboundEvent>,
        cancel: CancellationToken,
    ) -> Result<(), AutomationError> {
        let mut pending_edit: Option<Instant> = None;
        let mut input_closed = false;

        loop {
            if input_closed && pending_edit.is_none() && self.engine.deadline().is_none() {
                tracing::info!("Input drained, dispatcher stopping");
                return Ok(());
            }
            let attempt_deadline = self.engine.deadline();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Dispatcher cancelled");
                    return Ok(());
                }
                _ = sleep_until_opt(attempt_deadline) => {
                    let expired = self.engine.check_timeout();
                    self.record(expired)?;
                }
                _ = sleep_until_opt(pending_edit) => {
                    pending_edit = None;
                    let result = self.engine.step().await;
                    self.record(result)?;
                }
                event = rx.recv(), if !input_closed => match event {
                    Some(event) => self.on_event(event, &mut pending_edit).await?,
                    None => {
                        tracing::info!("Event stream closed");
                        input_closed = true;
                    }
                },
            }
        }
    }

    async fn on_event(&mut self, event: InboundEvent, pending_edit: &mut Option<Instant>) -> Result<(), AutomationError> {
        if !self.filter.accepts(&event) {
            tracing::trace!(sender_id = event.sender_id, "Event from untracked sender dropped");
            return Ok(());
        }
        let starts_attempt = self.engine.is_trigger(&event.text) && !self.engine.is_active();
        if !event.is_edit || starts_attempt {
            if starts_attempt && pending_edit.take().is_some() {
                tracing::debug!(message_id = event.message_id, "Pending edit folded into trigger");
            }
            let result = self.engine.process(&event).await;
            return self.record(result);
        }
        if self.engine.observe(&event).is_none() {
            // 纯文本编辑不改变键盘
            return Ok(());
        }
        if pending_edit.is_some() {
            tracing::debug!(message_id = event.message_id, "Edit debounce restarted");
        }
        *pending_edit = Some(Instant::now() + self.debounce);
        Ok(())
    }
}

fn check(result: StepResult) -> StepResult {
    result.map_err(|err| {
        tracing::error!(error = %err, "Dispatcher stopping on unrecoverable error");
        err
    })
}
