//! 用户存储的抽象接口。
//!
//! 用户的增删改查由外部系统负责，这里只声明在线状态聚合和
//! 通知分发所需要的窄接口。

use async_trait::async_trait;
use domain::{PushSubscription, RepositoryError, Role, StatusPreference, User, UserId};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// 按角色集合查询用户，`online_only` 为 true 时只返回当前在线的用户。
    async fn find_by_roles(
        &self,
        roles: &[Role],
        online_only: bool,
    ) -> Result<Vec<User>, RepositoryError>;

    /// 按 id 集合查询用户，过滤语义与 `find_by_roles` 一致。
    async fn find_by_ids(
        &self,
        ids: &[UserId],
        online_only: bool,
    ) -> Result<Vec<User>, RepositoryError>;

    /// 只更新派生的在线标记，单字段写入。
    async fn update_online(&self, id: UserId, online: bool) -> Result<(), RepositoryError>;

    async fn update_status_preference(
        &self,
        id: UserId,
        preference: StatusPreference,
    ) -> Result<(), RepositoryError>;

    /// 整体替换用户的订阅集合（注册、登出、清除失效端点共用）。
    async fn update_subscriptions(
        &self,
        id: UserId,
        subscriptions: Vec<PushSubscription>,
    ) -> Result<(), RepositoryError>;
}

/// 内存实现（用于测试和单机开发）。
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct InMemoryUserRepository {
        users: RwLock<HashMap<UserId, User>>,
    }

    impl InMemoryUserRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert(&self, user: User) {
            self.users.write().await.insert(user.id, user);
        }
    }

    #[async_trait]
    impl UserRepository for InMemoryUserRepository {
        async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
            Ok(self.users.read().await.get(&id).cloned())
        }

        async fn find_by_roles(
            &self,
            roles: &[Role],
            online_only: bool,
        ) -> Result<Vec<User>, RepositoryError> {
            let users = self.users.read().await;
            Ok(users
                .values()
                .filter(|u| roles.contains(&u.role))
                .filter(|u| !online_only || u.online)
                .cloned()
                .collect())
        }

        async fn find_by_ids(
            &self,
            ids: &[UserId],
            online_only: bool,
        ) -> Result<Vec<User>, RepositoryError> {
            let users = self.users.read().await;
            Ok(users
                .values()
                .filter(|u| ids.contains(&u.id))
                .filter(|u| !online_only || u.online)
                .cloned()
                .collect())
        }

        async fn update_online(&self, id: UserId, online: bool) -> Result<(), RepositoryError> {
            let mut users = self.users.write().await;
            let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            user.online = online;
            Ok(())
        }

        async fn update_status_preference(
            &self,
            id: UserId,
            preference: StatusPreference,
        ) -> Result<(), RepositoryError> {
            let mut users = self.users.write().await;
            let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            user.status_preference = preference;
            Ok(())
        }

        async fn update_subscriptions(
            &self,
            id: UserId,
            subscriptions: Vec<PushSubscription>,
        ) -> Result<(), RepositoryError> {
            let mut users = self.users.write().await;
            let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            user.push_subscriptions = subscriptions;
            Ok(())
        }
    }
}
