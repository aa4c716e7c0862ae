//! 通知分发与扇出。
//!
//! `ignite` 按受众解析目标用户，`deliver` 把同一份载荷独立投递到
//! 用户的每个推送端点。端点之间、用户之间完全隔离，单点失败
//! 不影响其余投递，也不向调用方抛错。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{
    AudiencePayloads, DomainError, NotificationPayload, PushSubscription, SelectionCriteria, User,
    UserId,
};
use futures::future::join_all;
use tokio::sync::RwLock;

use crate::error::ApplicationError;
use crate::push::{PushError, PushSender};
use crate::repository::UserRepository;
use crate::user_locks::UserLockMap;

pub struct NotificationServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub push_sender: Arc<dyn PushSender>,
}

pub struct NotificationService {
    deps: NotificationServiceDependencies,
    /// 同一端点连续失败多少次后清除订阅；None 表示保留失效端点
    purge_after_failures: Option<u32>,
    failure_counts: RwLock<HashMap<String, u32>>,
    // 订阅集合整体读改写，同一用户的修改必须串行
    subscription_locks: UserLockMap,
}

impl NotificationService {
    pub fn new(deps: NotificationServiceDependencies, purge_after_failures: Option<u32>) -> Self {
        Self {
            deps,
            purge_after_failures,
            failure_counts: RwLock::new(HashMap::new()),
            subscription_locks: UserLockMap::new(),
        }
    }

    /// 向用户的全部推送端点投递一份载荷。
    ///
    /// 永远不向调用方返回错误：序列化失败、端点失效、网络故障都在
    /// 这里吸收并记日志。各端点并发且互相独立。
    pub async fn deliver(&self, user: &User, payload: &NotificationPayload) {
        if user.push_subscriptions.is_empty() {
            tracing::debug!(user_id = %user.id, "no push subscriptions, nothing to deliver");
            return;
        }

        let payload = payload.clone().with_default_icon();
        let serialized = match serde_json::to_string(&payload) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(user_id = %user.id, error = %err, "failed to serialize payload");
                return;
            }
        };

        let attempts = user.push_subscriptions.iter().map(|subscription| {
            let serialized = serialized.as_str();
            async move {
                let result = self.deps.push_sender.send(subscription, serialized).await;
                (subscription, result)
            }
        });

        let mut delivered = 0usize;
        let mut failed = 0usize;
        let mut dead_endpoints = Vec::new();
        for (subscription, result) in join_all(attempts).await {
            match result {
                Ok(()) => {
                    delivered += 1;
                    self.reset_failures(&subscription.endpoint).await;
                }
                Err(err) => {
                    failed += 1;
                    tracing::debug!(
                        user_id = %user.id,
                        endpoint = %subscription.endpoint,
                        error = %err,
                        "push delivery failed"
                    );
                    if self.record_failure(&subscription.endpoint, &err).await {
                        dead_endpoints.push(subscription.endpoint.clone());
                    }
                }
            }
        }

        tracing::debug!(user_id = %user.id, delivered, failed, "push fan-out complete");

        if !dead_endpoints.is_empty() {
            self.purge_endpoints(user.id, &dead_endpoints).await;
        }
    }

    /// 按选择条件解析受众并逐用户扇出。
    ///
    /// 角色受众和 id 受众独立查询、独立投递，同时命中两个受众的
    /// 用户会收到两份通知。校验失败时直接返回，不触发任何查询。
    pub async fn ignite(
        &self,
        criteria: SelectionCriteria,
        payloads: AudiencePayloads,
    ) -> Result<(), ApplicationError> {
        payloads.validate()?;
        criteria.validate()?;

        let role_audience = async {
            if criteria.roles.is_empty() {
                return;
            }
            let Some(payload) = payloads.role.as_ref() else {
                tracing::warn!("role audience selected but no role payload provided");
                return;
            };
            match self
                .deps
                .user_repository
                .find_by_roles(&criteria.roles, criteria.online_only)
                .await
            {
                Ok(users) => self.fan_out(&users, payload).await,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to resolve role audience");
                }
            }
        };

        let id_audience = async {
            if criteria.ids.is_empty() {
                return;
            }
            let Some(payload) = payloads.id.as_ref() else {
                tracing::warn!("id audience selected but no id payload provided");
                return;
            };
            match self
                .deps
                .user_repository
                .find_by_ids(&criteria.ids, criteria.online_only)
                .await
            {
                Ok(users) => self.fan_out(&users, payload).await,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to resolve id audience");
                }
            }
        };

        tokio::join!(role_audience, id_audience);
        Ok(())
    }

    /// 注册一个推送端点，按 endpoint 去重。
    pub async fn subscribe(
        &self,
        user_id: UserId,
        subscription: PushSubscription,
    ) -> Result<(), ApplicationError> {
        let guard = self.subscription_locks.acquire(user_id).await;
        let result = self.subscribe_locked(user_id, subscription).await;
        drop(guard);
        self.subscription_locks.release(user_id).await;
        result
    }

    /// 移除匹配端点的订阅（登出路径）。
    pub async fn unsubscribe(
        &self,
        user_id: UserId,
        endpoint: &str,
    ) -> Result<(), ApplicationError> {
        let guard = self.subscription_locks.acquire(user_id).await;
        let result = self.unsubscribe_locked(user_id, endpoint).await;
        drop(guard);
        self.subscription_locks.release(user_id).await;
        result
    }

    async fn subscribe_locked(
        &self,
        user_id: UserId,
        subscription: PushSubscription,
    ) -> Result<(), ApplicationError> {
        let mut user = self.load_user(user_id).await?;
        if user.add_subscription(subscription) {
            self.deps
                .user_repository
                .update_subscriptions(user.id, user.push_subscriptions)
                .await?;
        }
        Ok(())
    }

    async fn unsubscribe_locked(
        &self,
        user_id: UserId,
        endpoint: &str,
    ) -> Result<(), ApplicationError> {
        let mut user = self.load_user(user_id).await?;
        if user.remove_subscription(endpoint) {
            self.deps
                .user_repository
                .update_subscriptions(user.id, user.push_subscriptions)
                .await?;
        }
        Ok(())
    }

    async fn fan_out(&self, users: &[User], payload: &NotificationPayload) {
        join_all(users.iter().map(|user| self.deliver(user, payload))).await;
    }

    async fn load_user(&self, user_id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::UserNotFound))
    }

    async fn reset_failures(&self, endpoint: &str) {
        if self.purge_after_failures.is_some() {
            self.failure_counts.write().await.remove(endpoint);
        }
    }

    /// 记录一次失败，返回该端点是否达到清除阈值。
    async fn record_failure(&self, endpoint: &str, error: &PushError) -> bool {
        let Some(threshold) = self.purge_after_failures else {
            return false;
        };
        // 端点明确失效时不等阈值，直接清除
        if matches!(error, PushError::EndpointGone { .. }) {
            return true;
        }
        let mut counts = self.failure_counts.write().await;
        let count = counts.entry(endpoint.to_string()).or_insert(0);
        *count += 1;
        *count >= threshold
    }

    async fn purge_endpoints(&self, user_id: UserId, endpoints: &[String]) {
        let guard = self.subscription_locks.acquire(user_id).await;
        let result = self.purge_endpoints_locked(user_id, endpoints).await;
        drop(guard);
        self.subscription_locks.release(user_id).await;

        if let Err(err) = result {
            tracing::warn!(user_id = %user_id, error = %err, "failed to purge dead endpoints");
        }
    }

    async fn purge_endpoints_locked(
        &self,
        user_id: UserId,
        endpoints: &[String],
    ) -> Result<(), ApplicationError> {
        // 投递用的是快照，清除前重新加载，保留期间注册的订阅
        let user = self.load_user(user_id).await?;
        let remaining: Vec<PushSubscription> = user
            .push_subscriptions
            .iter()
            .filter(|s| !endpoints.contains(&s.endpoint))
            .cloned()
            .collect();
        if remaining.len() == user.push_subscriptions.len() {
            return Ok(());
        }

        self.deps
            .user_repository
            .update_subscriptions(user_id, remaining)
            .await?;

        let mut counts = self.failure_counts.write().await;
        for endpoint in endpoints {
            counts.remove(endpoint);
            tracing::info!(user_id = %user_id, endpoint = %endpoint, "dead push endpoint purged");
        }
        Ok(())
    }
}
