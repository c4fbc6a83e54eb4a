//! 聊天系统核心领域模型
//!
//! 包含用户、聊天消息等核心实体，以及邮箱、消息正文等经过校验的值对象。

pub mod errors;
pub mod message;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{ChatMessage, NewChatMessage, Participant};
pub use user::User;
pub use value_objects::{MessageId, MessageText, PasswordHash, Timestamp, UserEmail, UserId};
