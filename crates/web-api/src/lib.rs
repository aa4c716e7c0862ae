//! HTTP / WebSocket 接入层。
//!
//! 对外暴露通知触发与订阅管理的 REST 接口，以及携带 token 的
//! WebSocket 实时通道。

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws_connection;

pub use auth::JwtService;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
