use serde::Serialize;

use crate::user::User;
use crate::value_objects::{MessageId, MessageText, Timestamp, UserEmail, UserId};

/// 消息的发送方或接收方
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub id: UserId,
    pub email: UserEmail,
}

impl From<&User> for Participant {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
        }
    }
}

/// 尚未持久化的消息，id 和时间戳由消息存储分配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub sender: Participant,
    pub receiver: Option<Participant>,
    pub text: MessageText,
}

impl NewChatMessage {
    pub fn into_message(self, id: MessageId, created_at: Timestamp) -> ChatMessage {
        ChatMessage {
            id,
            sender: self.sender,
            receiver: self.receiver,
            text: self.text,
            created_at,
        }
    }
}

/// 已持久化的聊天消息，创建后不可变。没有接收方的消息是广播消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: Participant,
    pub receiver: Option<Participant>,
    pub text: MessageText,
    pub created_at: Timestamp,
}

impl ChatMessage {
    pub fn is_broadcast(&self) -> bool {
        self.receiver.is_none()
    }

    /// 用户是否为该消息的发送方或接收方
    pub fn involves(&self, user_id: UserId) -> bool {
        self.sender.id == user_id
            || self
                .receiver
                .as_ref()
                .is_some_and(|receiver| receiver.id == user_id)
    }
}
