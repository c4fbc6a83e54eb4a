use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::password::PasswordHasherError;
use crate::token::TokenError;

/// 对外可见的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    InvalidToken,
    Internal,
}

/// 登录失败的真实原因。对客户端一律表现为 unauthorized，只用于日志诊断。
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("malformed email")]
    MalformedEmail,
    #[error("account not found")]
    UnknownAccount,
    #[error("password mismatch")]
    PasswordMismatch,
    #[error("account lookup failed: {0}")]
    DirectoryUnavailable(#[source] RepositoryError),
}

/// 令牌格式正确但无法接受的原因
#[derive(Debug, Error)]
pub enum TokenRejection {
    #[error("identity does not exist")]
    UnknownIdentity,
    #[error("token superseded by a later login")]
    Superseded,
    #[error("identity lookup failed: {0}")]
    DirectoryUnavailable(#[source] RepositoryError),
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("recipient {0} not found")]
    RecipientNotFound(String),
    #[error("unauthorized access")]
    Unauthorized { cause: AuthFailure },
    #[error("invalid token")]
    InvalidToken { cause: TokenRejection },
    #[error("token could not be parsed: {0}")]
    TokenMalformed(#[source] TokenError),
    #[error("token error: {0}")]
    Token(#[source] TokenError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
}

impl ApplicationError {
    pub fn unauthorized(cause: AuthFailure) -> Self {
        Self::Unauthorized { cause }
    }

    pub fn invalid_token(cause: TokenRejection) -> Self {
        Self::InvalidToken { cause }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(_) | Self::RecipientNotFound(_) => ErrorKind::Validation,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::InvalidToken { .. } => ErrorKind::InvalidToken,
            Self::TokenMalformed(_) | Self::Token(_) | Self::Repository(_) | Self::Password(_) => {
                ErrorKind::Internal
            }
        }
    }
}
