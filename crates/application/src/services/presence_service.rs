//! 在线状态聚合。
//!
//! 从连接注册表和用户的状态偏好推导唯一权威的在线标记，
//! 发生变化时持久化并广播，没有变化时什么都不做。

use std::sync::Arc;

use domain::{DomainError, StatusPreference, UserId};

use crate::broadcaster::{PresenceBroadcaster, PresenceUpdate};
use crate::error::ApplicationError;
use crate::registry::ConnectionRegistry;
use crate::repository::UserRepository;
use crate::user_locks::UserLockMap;

pub struct PresenceServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<dyn PresenceBroadcaster>,
}

pub struct PresenceService {
    deps: PresenceServiceDependencies,
    // 同一用户的重算必须串行，保证广播事件的每用户顺序
    user_locks: UserLockMap,
}

impl PresenceService {
    pub fn new(deps: PresenceServiceDependencies) -> Self {
        Self {
            deps,
            user_locks: UserLockMap::new(),
        }
    }

    /// 重新推导用户的在线状态。
    ///
    /// 发生状态迁移时返回 `Some(new_online)`，未变化时返回 `None`
    /// 且不产生任何写入和广播。
    pub async fn recompute(&self, user_id: UserId) -> Result<Option<bool>, ApplicationError> {
        let guard = self.user_locks.acquire(user_id).await;
        let result = self.recompute_locked(user_id).await;
        drop(guard);
        self.user_locks.release(user_id).await;
        result
    }

    /// 用户通过资料更新显式修改状态偏好，持久化后走同一条重算路径。
    pub async fn set_status_preference(
        &self,
        user_id: UserId,
        preference: StatusPreference,
    ) -> Result<Option<bool>, ApplicationError> {
        let guard = self.user_locks.acquire(user_id).await;
        let result = async {
            self.deps
                .user_repository
                .update_status_preference(user_id, preference)
                .await?;
            self.recompute_locked(user_id).await
        }
        .await;
        drop(guard);
        self.user_locks.release(user_id).await;
        result
    }

    #[cfg(test)]
    pub(crate) async fn lock_entries(&self) -> usize {
        self.user_locks.len().await
    }

    /// 传输层事件处理器使用的 best-effort 包装：
    /// 在线状态是自愈的，失败只记日志，绝不让连接处理崩溃。
    pub async fn sync(&self, user_id: UserId) {
        if let Err(err) = self.recompute(user_id).await {
            tracing::warn!(user_id = %user_id, error = %err, "presence recompute failed");
        }
    }

    async fn recompute_locked(&self, user_id: UserId) -> Result<Option<bool>, ApplicationError> {
        let user = self
            .deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::UserNotFound))?;

        let clients = self.deps.registry.count(user_id).await;
        let new_online = user.derive_online(clients);
        if new_online == user.online {
            return Ok(None);
        }

        self.deps
            .user_repository
            .update_online(user_id, new_online)
            .await?;
        tracing::info!(user_id = %user_id, online = new_online, clients, "presence transition");

        // 广播本身是 fire-and-forget，持久化成功后失败只会丢一次事件
        if let Err(err) = self
            .deps
            .broadcaster
            .publish(PresenceUpdate {
                user_id,
                online: new_online,
            })
            .await
        {
            tracing::warn!(user_id = %user_id, error = %err, "presence broadcast failed");
        }

        Ok(Some(new_online))
    }
}
