//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、令牌签发与校验、
//! 以及对外部适配器（账户目录、消息存储、密码哈希、令牌编解码）的抽象。

pub mod clock;
pub mod error;
pub mod memory;
pub mod password;
pub mod repository;
pub mod services;
pub mod token;

pub use clock::{Clock, SystemClock};
pub use error::{ApplicationError, AuthFailure, ErrorKind, TokenRejection};
pub use password::{PasswordHasher, PasswordHasherError};
pub use repository::{AccountDirectory, MessageStore};
pub use services::{
    AccountService, AccountServiceDependencies, AuthorizeUserRequest, CreateMessageRequest,
    RegisterUserRequest, DEFAULT_HISTORY_LIMIT, MIN_PASSWORD_LENGTH,
};
pub use token::{TokenClaims, TokenCodec, TokenError};
