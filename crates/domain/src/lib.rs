//! 领域层。
//!
//! 定义用户、推送订阅、通知载荷等核心模型，以及各层共享的错误类型。
//! 不依赖任何运行时或存储实现。

pub mod errors;
pub mod notification;
pub mod subscription;
pub mod user;
pub mod value_objects;

pub use errors::{DomainError, DomainResult, RepositoryError};
pub use notification::{
    AudiencePayloads, NotificationPayload, SelectionCriteria, DEFAULT_ICON,
};
pub use subscription::{PushSubscription, SubscriptionKeys};
pub use user::User;
pub use value_objects::{ConnectionId, Role, StatusPreference, Timestamp, UserId};
