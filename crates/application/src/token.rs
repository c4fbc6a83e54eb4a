use domain::UserEmail;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 令牌携带的声明。没有过期时间，有效性取决于签名和所指向的身份。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub email: String,
    /// 每次签发唯一，保证重新登录得到的令牌与之前不同
    pub jti: String,
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error("token is malformed or has a bad signature: {0}")]
    Malformed(String),
}

/// 签发并校验携带身份声明的 bearer 令牌
pub trait TokenCodec: Send + Sync {
    fn issue(&self, email: &UserEmail) -> Result<String, TokenError>;
    fn decode(&self, token: &str) -> Result<TokenClaims, TokenError>;
}
