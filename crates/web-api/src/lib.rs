//! Web API 层。
//!
//! 提供 Axum 路由（注册、登录、个人信息、WebSocket），以及消息中枢和在线会话注册表。

mod auth;
mod error;
pub mod events;
pub mod hub;
pub mod registry;
mod routes;
mod state;
mod ws_connection;

pub use auth::{CurrentUser, TOKEN_HEADER};
pub use error::ApiError;
pub use events::{ClientMessage, ServerEvent};
pub use hub::{Hub, DEFAULT_OUTBOUND_BUFFER};
pub use registry::{DeliveryError, SessionHandle, SessionRegistry};
pub use routes::router;
pub use state::AppState;
