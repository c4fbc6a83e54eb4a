use serde::Serialize;

use crate::value_objects::{PasswordHash, Timestamp, UserEmail, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: UserEmail,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    /// 最近一次登录签发的令牌，每次登录都会被覆盖。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn register(id: UserId, email: UserEmail, password: PasswordHash, now: Timestamp) -> Self {
        Self {
            id,
            email,
            password,
            token: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn issue_token(&mut self, token: impl Into<String>, now: Timestamp) {
        self.token = Some(token.into());
        self.updated_at = now;
    }

    /// 令牌是否为该账户当前持有的令牌
    pub fn holds_token(&self, token: &str) -> bool {
        self.token.as_deref() == Some(token)
    }
}
