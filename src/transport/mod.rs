//! 传输层抽象
//!
//! 引擎只依赖这里的 `Transport` trait 与 `InboundEvent`：真实客户端、测试用 Mock、
//! 以及 JSONL 回放都实现同一个接口。

mod mock;
mod replay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::automation::snapshot::{InvocationToken, Keyboard, MessageId};
use crate::core::TransportError;

pub use mock::{MockTransport, RecordedInvocation};
pub use replay::{read_events, ReplayTransport};

/// 远端发送者 ID
pub type SenderId = i64;

/// 入站事件：新消息或对已有消息的编辑
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub message_id: MessageId,
    #[serde(default)]
    pub text: String,
    /// 消息附带的键盘；没有键盘的事件不会更新快照
    #[serde(default)]
    pub options: Option<Keyboard>,
    #[serde(default)]
    pub is_edit: bool,
    pub sender_id: SenderId,
}

impl InboundEvent {
    pub fn message(message_id: MessageId, sender_id: SenderId, text: impl Into<String>) -> Self {
        Self {
            message_id,
            text: text.into(),
            options: None,
            is_edit: false,
            sender_id,
        }
    }

    pub fn edit(message_id: MessageId, sender_id: SenderId, text: impl Into<String>) -> Self {
        Self {
            is_edit: true,
            ..Self::message(message_id, sender_id, text)
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.options = Some(keyboard);
        self
    }
}

/// 只放行被跟踪的远端发送者
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderFilter {
    tracked: Option<SenderId>,
}

impl SenderFilter {
    pub fn new(tracked: Option<SenderId>) -> Self {
        Self { tracked }
    }

    pub fn accepts(&self, event: &InboundEvent) -> bool {
        self.tracked.map_or(true, |id| id == event.sender_id)
    }
}

/// 远端交互服务客户端
#[async_trait]
pub trait Transport: Send + Sync {
    /// 点击消息上的某个选项，等待远端应答
    async fn invoke(&self, message_id: MessageId, token: &InvocationToken) -> Result<(), TransportError>;

    /// 向远端发送一条文本（例如请求新菜单的 /start）
    async fn send_text(&self, text: &str) -> Result<(), TransportError>;
}
