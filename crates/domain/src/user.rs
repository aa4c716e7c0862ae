use serde::{Deserialize, Serialize};

use crate::subscription::PushSubscription;
use crate::value_objects::{Role, StatusPreference, Timestamp, UserId};

/// 用户记录。
///
/// `online` 是持久化的派生字段，只允许在线状态聚合逻辑修改；
/// `status_preference` 是用户手动设置的意图。两者的约束：
/// 偏好为 Offline 时 `online` 必须为 false，否则 `online` 等价于
/// 当前是否存在活跃连接。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub status_preference: StatusPreference,
    pub online: bool,
    pub push_subscriptions: Vec<PushSubscription>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    /// 根据状态偏好和活跃连接数推导应当持久化的在线状态。
    pub fn derive_online(&self, connection_count: usize) -> bool {
        self.status_preference != StatusPreference::Offline && connection_count > 0
    }

    /// 注册一个推送端点，按 endpoint 去重；已存在时不做任何修改。
    ///
    /// 返回是否发生了变更。
    pub fn add_subscription(&mut self, subscription: PushSubscription) -> bool {
        let exists = self
            .push_subscriptions
            .iter()
            .any(|s| s.endpoint == subscription.endpoint);
        if exists {
            return false;
        }
        self.push_subscriptions.push(subscription);
        true
    }

    /// 移除匹配端点的订阅（登出路径）。返回是否发生了变更。
    pub fn remove_subscription(&mut self, endpoint: &str) -> bool {
        let before = self.push_subscriptions.len();
        self.push_subscriptions.retain(|s| s.endpoint != endpoint);
        self.push_subscriptions.len() != before
    }
}
