//! Mock 传输（用于测试，无需真实连接）
//!
//! 记录每一次点击与发送的文本；可预置下一次点击的失败结果，也可模拟应答延迟。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::automation::snapshot::{InvocationToken, MessageId};
use crate::core::TransportError;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvocation {
    pub message_id: MessageId,
    pub token: InvocationToken,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    invocations: Mutex<Vec<RecordedInvocation>>,
    sent: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<TransportError>>,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次点击先等待 `latency` 再应答
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// 预置下一次点击的失败（按顺序消费）
    pub fn fail_next(&self, err: TransportError) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).push_back(err);
    }

    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn invoked_tokens(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.token.0).collect()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn invoke(&self, message_id: MessageId, token: &InvocationToken) -> Result<(), TransportError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedInvocation {
                message_id,
                token: token.clone(),
            });
        match self.failures.lock().unwrap_or_else(|e| e.into_inner()).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }
}
