//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、bcrypt 密码哈希和 JWT 令牌编解码，实现应用层定义的接口。

pub mod migrations;
pub mod password;
pub mod repository;
pub mod token;

pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{create_pg_pool, PgAccountDirectory, PgMessageStore};
pub use token::JwtTokenCodec;
