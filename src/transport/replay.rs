//! JSONL 回放：从录制的事件流驱动引擎
//!
//! 每行一个 `InboundEvent` JSON；点击与发送只写日志并立即应答成功。

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::automation::snapshot::{InvocationToken, MessageId};
use crate::core::TransportError;
use crate::transport::{InboundEvent, Transport};

#[derive(Debug, Default)]
pub struct ReplayTransport {
    invoked: AtomicU64,
}

impl ReplayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invoked(&self) -> u64 {
        self.invoked.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn invoke(&self, message_id: MessageId, token: &InvocationToken) -> Result<(), TransportError> {
        self.invoked.fetch_add(1, Ordering::Relaxed);
        tracing::info!(message_id, token = %token.0, "Replay: invocation acknowledged");
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        tracing::info!(text, "Replay: text sent");
        Ok(())
    }
}

/// 逐行读取事件并送入调度通道；返回成功转发的事件数。
/// 无法解析的行记录警告后跳过；接收端关闭时提前结束。
pub async fn read_events<R>(reader: R, tx: mpsc::Sender<InboundEvent>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: InboundEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(line_no, "Skipping malformed event: {}", e);
                continue;
            }
        };
        if tx.send(event).await.is_err() {
            tracing::debug!("Dispatcher closed, stop reading events");
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}
