use async_trait::async_trait;
use domain::UserId;
use thiserror::Error;

/// 在线状态变更事件，发给系统内所有已连接的客户端。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PresenceUpdate {
    pub user_id: UserId,
    pub online: bool,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 在线状态广播器。
///
/// 投递是 fire-and-forget：不确认、不重试、不补发，事件发生后才
/// 连上来的客户端直接错过。同一用户的事件必须按发布顺序被观察到。
#[async_trait]
pub trait PresenceBroadcaster: Send + Sync {
    async fn publish(&self, update: PresenceUpdate) -> Result<(), BroadcastError>;
}
