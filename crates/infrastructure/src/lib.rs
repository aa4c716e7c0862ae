//! 基础设施层。
//!
//! 提供应用层抽象的具体适配器：进程内广播、推送投递的 HTTP 客户端、
//! PostgreSQL 用户仓储。

pub mod broadcast;
pub mod db;
pub mod push;

pub use broadcast::LocalPresenceBroadcaster;
pub use db::{create_pg_pool, DbPool, PgUserRepository};
pub use push::HttpPushSender;
