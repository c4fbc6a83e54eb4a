use async_trait::async_trait;
use domain::{ChatMessage, NewChatMessage, PasswordHash, RepositoryError, User, UserEmail, UserId};

/// 账户目录：按邮箱持久化和查找用户
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// 创建账户；邮箱已存在时返回已有账户而不是报错
    async fn create_or_fetch(
        &self,
        email: UserEmail,
        password: PasswordHash,
    ) -> Result<User, RepositoryError>;

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError>;

    /// 覆盖账户当前令牌，返回更新后的账户
    async fn store_token(&self, id: UserId, token: &str) -> Result<User, RepositoryError>;
}

/// 消息存储。查询结果按创建时间升序返回（最旧的在前）。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 保存消息，由存储分配 id 和时间戳
    async fn create(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError>;

    /// 最近 `limit` 条广播消息
    async fn last_broadcasts(&self, limit: usize) -> Result<Vec<ChatMessage>, RepositoryError>;

    /// 最近 `limit` 条由该用户发送或发给该用户的消息
    async fn last_involving(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;
}
