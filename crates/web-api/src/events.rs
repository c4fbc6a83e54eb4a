//! WebSocket 上的消息格式
//!
//! 服务端推送统一为 `{"type": ..., "data": ...}`，客户端发送 `{"to": ..., "text": ...}`。

use domain::{ChatMessage, MessageId, Timestamp, UserEmail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerEvent {
    Message(MessagePayload),
    Join(JoinPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// 只在服务端内部使用，不出现在推送内容里
    #[serde(skip)]
    pub id: Option<MessageId>,
    pub from: String,
    /// 广播消息为空字符串
    pub to: String,
    pub text: String,
    pub date_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub user: String,
}

impl ServerEvent {
    pub fn join(user: &UserEmail) -> Self {
        Self::Join(JoinPayload {
            user: user.to_string(),
        })
    }

    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::Message(payload) => payload.id,
            Self::Join(_) => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&ChatMessage> for ServerEvent {
    fn from(message: &ChatMessage) -> Self {
        Self::Message(MessagePayload {
            id: Some(message.id),
            from: message.sender.email.to_string(),
            to: message
                .receiver
                .as_ref()
                .map(|receiver| receiver.email.to_string())
                .unwrap_or_default(),
            text: message.text.to_string(),
            date_time: message.created_at,
        })
    }
}

/// 客户端发来的一条消息，`to` 为空或缺省表示广播
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub to: String,
    pub text: String,
}

impl ClientMessage {
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}
