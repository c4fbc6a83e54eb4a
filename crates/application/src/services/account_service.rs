use std::sync::Arc;

use domain::{ChatMessage, MessageText, NewChatMessage, Participant, User, UserEmail};

use crate::{
    error::{ApplicationError, AuthFailure, TokenRejection},
    password::PasswordHasher,
    repository::{AccountDirectory, MessageStore},
    services::history::merge_history,
    token::{TokenCodec, TokenError},
};

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AuthorizeUserRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct CreateMessageRequest {
    /// 接收方邮箱，为空表示广播
    pub receiver_email: String,
    pub text: String,
}

pub struct AccountServiceDependencies {
    pub account_directory: Arc<dyn AccountDirectory>,
    pub message_store: Arc<dyn MessageStore>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub token_codec: Arc<dyn TokenCodec>,
    /// 历史回放时每类消息最多取多少条
    pub history_limit: usize,
}

/// 注册、登录、令牌校验、消息创建和历史查询
pub struct AccountService {
    deps: AccountServiceDependencies,
}

impl AccountService {
    pub fn new(deps: AccountServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(&self, request: RegisterUserRequest) -> Result<User, ApplicationError> {
        let email = UserEmail::parse(request.email)?;

        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(domain::DomainError::invalid_argument(
                "password",
                format!("must be at least {MIN_PASSWORD_LENGTH} characters"),
            )
            .into());
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;

        // 邮箱已存在时目录返回已有账户，注册因此按邮箱幂等
        let mut user = self
            .deps
            .account_directory
            .create_or_fetch(email, password_hash)
            .await?;
        // 已登录账户的令牌只在 authorize 中返回
        user.token = None;

        tracing::info!(user = %user.email, user_id = %user.id, "account registered");
        Ok(user)
    }

    pub async fn authorize(&self, request: AuthorizeUserRequest) -> Result<User, ApplicationError> {
        let email = UserEmail::parse(request.email)
            .map_err(|_| self.reject(AuthFailure::MalformedEmail))?;

        let user = match self.deps.account_directory.find_by_email(&email).await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(self.reject(AuthFailure::UnknownAccount)),
            Err(err) => return Err(self.reject(AuthFailure::DirectoryUnavailable(err))),
        };

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !password_ok {
            return Err(self.reject(AuthFailure::PasswordMismatch));
        }

        let token = self
            .deps
            .token_codec
            .issue(&user.email)
            .map_err(ApplicationError::Token)?;

        // 新令牌覆盖旧令牌，之前签发的令牌从此不再被接受
        let user = self
            .deps
            .account_directory
            .store_token(user.id, &token)
            .await?;

        tracing::info!(user = %user.email, "account authorized");
        Ok(user)
    }

    pub async fn validate_token(&self, token: &str) -> Result<User, ApplicationError> {
        let claims = self.deps.token_codec.decode(token).map_err(|err| {
            tracing::debug!(error = %err, "error parsing token");
            ApplicationError::TokenMalformed(err)
        })?;

        let email = UserEmail::parse(claims.email).map_err(|err| {
            tracing::debug!(error = %err, "error parsing email from token");
            ApplicationError::TokenMalformed(TokenError::Malformed(err.to_string()))
        })?;

        let user = match self.deps.account_directory.find_by_email(&email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::debug!(user = %email, "token refers to unknown identity");
                return Err(ApplicationError::invalid_token(TokenRejection::UnknownIdentity));
            }
            Err(err) => {
                tracing::warn!(user = %email, error = %err, "identity lookup failed during token validation");
                return Err(ApplicationError::invalid_token(
                    TokenRejection::DirectoryUnavailable(err),
                ));
            }
        };

        if !user.holds_token(token) {
            tracing::debug!(user = %email, "token superseded by a later login");
            return Err(ApplicationError::invalid_token(TokenRejection::Superseded));
        }

        Ok(user)
    }

    pub async fn create_message(
        &self,
        sender: &User,
        request: CreateMessageRequest,
    ) -> Result<ChatMessage, ApplicationError> {
        let text = MessageText::new(request.text)?;

        let receiver_email = request.receiver_email.trim();
        let receiver = if receiver_email.is_empty() {
            None
        } else {
            let email = UserEmail::parse(receiver_email)?;
            let receiver = self
                .deps
                .account_directory
                .find_by_email(&email)
                .await?
                .ok_or_else(|| ApplicationError::RecipientNotFound(email.to_string()))?;
            Some(Participant::from(&receiver))
        };

        let message = self
            .deps
            .message_store
            .create(NewChatMessage {
                sender: Participant::from(sender),
                receiver,
                text,
            })
            .await?;

        tracing::debug!(
            message_id = %message.id,
            from = %message.sender.email,
            broadcast = message.is_broadcast(),
            "chat message stored"
        );
        Ok(message)
    }

    /// 最近的广播消息与该用户收发的消息，按时间升序合并去重
    pub async fn chat_history(&self, user: &User) -> Result<Vec<ChatMessage>, ApplicationError> {
        let limit = self.deps.history_limit;
        let broadcasts = self.deps.message_store.last_broadcasts(limit).await?;
        let involving = self.deps.message_store.last_involving(user.id, limit).await?;
        Ok(merge_history(broadcasts, involving))
    }

    fn reject(&self, cause: AuthFailure) -> ApplicationError {
        match &cause {
            AuthFailure::DirectoryUnavailable(err) => {
                tracing::warn!(error = %err, "account lookup failed during authorization")
            }
            other => tracing::debug!(reason = %other, "authorization rejected"),
        }
        ApplicationError::unauthorized(cause)
    }
}
