//! 连接注册表。
//!
//! 进程内维护每个用户当前活跃的实时连接集合。同一用户可以同时持有
//! 多条连接（多设备、多标签页），在线状态以集合大小为准而不是以
//! 最后一次事件为准。注册表不做持久化，进程重启后由重连事件重建。

use std::collections::{HashMap, HashSet};

use domain::{ConnectionId, UserId};
use tokio::sync::RwLock;

/// 显式注入的进程级连接注册表。
///
/// 由传输层持有并在连接建立/断开时调用，在线状态聚合逻辑只读。
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<UserId, HashSet<ConnectionId>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一条新连接。重复登记同一连接是幂等的。
    pub async fn add_connection(&self, user_id: UserId, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        connections
            .entry(user_id)
            .or_default()
            .insert(connection_id);
        tracing::debug!(user_id = %user_id, connection_id = %connection_id, "connection registered");
    }

    /// 注销一条连接，用户的集合清空后整体移除。
    pub async fn remove_connection(&self, user_id: UserId, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(set) = connections.get_mut(&user_id) {
            set.remove(&connection_id);
            if set.is_empty() {
                connections.remove(&user_id);
            }
        }
        tracing::debug!(user_id = %user_id, connection_id = %connection_id, "connection unregistered");
    }

    /// 当前该用户的活跃连接数。
    pub async fn count(&self, user_id: UserId) -> usize {
        let connections = self.connections.read().await;
        connections.get(&user_id).map_or(0, HashSet::len)
    }

    /// 当前有至少一条活跃连接的用户数，仅用于日志和统计。
    pub async fn connected_users(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn count_tracks_multiple_connections_per_user() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new(Uuid::new_v4());
        let first = ConnectionId::generate();
        let second = ConnectionId::generate();

        registry.add_connection(user, first).await;
        registry.add_connection(user, second).await;
        assert_eq!(registry.count(user).await, 2);

        registry.remove_connection(user, first).await;
        assert_eq!(registry.count(user).await, 1);

        registry.remove_connection(user, second).await;
        assert_eq!(registry.count(user).await, 0);
        assert_eq!(registry.connected_users().await, 0);
    }

    #[tokio::test]
    async fn adding_same_connection_twice_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new(Uuid::new_v4());
        let conn = ConnectionId::generate();

        registry.add_connection(user, conn).await;
        registry.add_connection(user, conn).await;
        assert_eq!(registry.count(user).await, 1);
    }

    #[tokio::test]
    async fn removing_unknown_connection_is_a_noop() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new(Uuid::new_v4());
        registry
            .remove_connection(user, ConnectionId::generate())
            .await;
        assert_eq!(registry.count(user).await, 0);
    }

    #[tokio::test]
    async fn concurrent_add_and_remove_never_lose_updates() {
        let registry = Arc::new(ConnectionRegistry::new());
        let user = UserId::new(Uuid::new_v4());

        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let conn = ConnectionId::generate();
                registry.add_connection(user, conn).await;
                registry.remove_connection(user, conn).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.count(user).await, 0);
    }
}
