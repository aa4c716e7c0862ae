//! 应用层实现。
//!
//! 围绕在线状态聚合和通知扇出提供用例服务，处理输入校验、
//! 并发隔离，以及对外部适配器（用户存储、广播、推送投递）的抽象。

pub mod broadcaster;
pub mod error;
pub mod push;
pub mod registry;
pub mod repository;
pub mod services;
mod user_locks;

pub use broadcaster::{BroadcastError, PresenceBroadcaster, PresenceUpdate};
pub use error::ApplicationError;
pub use push::{PushError, PushSender};
pub use registry::ConnectionRegistry;
pub use repository::UserRepository;
pub use services::{
    NotificationService, NotificationServiceDependencies, PresenceService,
    PresenceServiceDependencies,
};
