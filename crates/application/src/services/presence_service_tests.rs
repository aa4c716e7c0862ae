//! 在线状态聚合的单元测试。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    ConnectionId, DomainError, PushSubscription, Role, StatusPreference, User, UserId,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::broadcaster::{BroadcastError, PresenceBroadcaster, PresenceUpdate};
use crate::error::ApplicationError;
use crate::registry::ConnectionRegistry;
use crate::repository::memory::InMemoryUserRepository;
use crate::services::presence_service::{PresenceService, PresenceServiceDependencies};

/// 记录所有已发布事件的广播器。
#[derive(Default)]
struct RecordingBroadcaster {
    events: Mutex<Vec<PresenceUpdate>>,
}

impl RecordingBroadcaster {
    async fn events(&self) -> Vec<PresenceUpdate> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl PresenceBroadcaster for RecordingBroadcaster {
    async fn publish(&self, update: PresenceUpdate) -> Result<(), BroadcastError> {
        self.events.lock().await.push(update);
        Ok(())
    }
}

struct Harness {
    service: PresenceService,
    repository: Arc<InMemoryUserRepository>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<RecordingBroadcaster>,
    user_id: UserId,
}

fn sample_user(id: UserId) -> User {
    let now = Utc::now();
    User {
        id,
        full_name: "Test User".into(),
        email: "test@example.com".into(),
        role: Role::parse("user").unwrap(),
        active: true,
        status_preference: StatusPreference::Online,
        online: false,
        push_subscriptions: vec![PushSubscription::new("https://push.example/0", "k", "a")],
        created_at: now,
        updated_at: now,
    }
}

async fn harness() -> Harness {
    let repository = Arc::new(InMemoryUserRepository::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let user_id = UserId::new(Uuid::new_v4());
    repository.insert(sample_user(user_id)).await;

    let service = PresenceService::new(PresenceServiceDependencies {
        user_repository: repository.clone(),
        registry: registry.clone(),
        broadcaster: broadcaster.clone(),
    });

    Harness {
        service,
        repository,
        registry,
        broadcaster,
        user_id,
    }
}

async fn stored_online(h: &Harness) -> bool {
    use crate::repository::UserRepository;
    h.repository
        .find_by_id(h.user_id)
        .await
        .unwrap()
        .unwrap()
        .online
}

#[tokio::test]
async fn first_connection_marks_user_online() {
    let h = harness().await;
    h.registry
        .add_connection(h.user_id, ConnectionId::generate())
        .await;

    let transition = h.service.recompute(h.user_id).await.unwrap();

    assert_eq!(transition, Some(true));
    assert!(stored_online(&h).await);
    assert_eq!(
        h.broadcaster.events().await,
        vec![PresenceUpdate {
            user_id: h.user_id,
            online: true
        }]
    );
}

#[tokio::test]
async fn second_connection_does_not_broadcast_again() {
    let h = harness().await;
    h.registry
        .add_connection(h.user_id, ConnectionId::generate())
        .await;
    h.service.recompute(h.user_id).await.unwrap();

    h.registry
        .add_connection(h.user_id, ConnectionId::generate())
        .await;
    let transition = h.service.recompute(h.user_id).await.unwrap();

    assert_eq!(transition, None);
    assert_eq!(h.broadcaster.events().await.len(), 1);
}

#[tokio::test]
async fn closing_one_of_two_connections_keeps_user_online() {
    let h = harness().await;
    let first = ConnectionId::generate();
    let second = ConnectionId::generate();
    h.registry.add_connection(h.user_id, first).await;
    h.registry.add_connection(h.user_id, second).await;
    h.service.recompute(h.user_id).await.unwrap();

    h.registry.remove_connection(h.user_id, first).await;
    let transition = h.service.recompute(h.user_id).await.unwrap();

    assert_eq!(transition, None);
    assert!(stored_online(&h).await);

    h.registry.remove_connection(h.user_id, second).await;
    let transition = h.service.recompute(h.user_id).await.unwrap();

    assert_eq!(transition, Some(false));
    assert!(!stored_online(&h).await);
}

#[tokio::test]
async fn invariant_holds_after_every_event() {
    let h = harness().await;
    let conns: Vec<ConnectionId> = (0..3).map(|_| ConnectionId::generate()).collect();

    for (i, conn) in conns.iter().enumerate() {
        h.registry.add_connection(h.user_id, *conn).await;
        h.service.recompute(h.user_id).await.unwrap();
        assert_eq!(stored_online(&h).await, i + 1 > 0);
    }
    for (i, conn) in conns.iter().enumerate() {
        h.registry.remove_connection(h.user_id, *conn).await;
        h.service.recompute(h.user_id).await.unwrap();
        let remaining = conns.len() - i - 1;
        assert_eq!(stored_online(&h).await, remaining > 0);
    }
}

#[tokio::test]
async fn offline_preference_wins_over_live_connections() {
    let h = harness().await;
    h.registry
        .add_connection(h.user_id, ConnectionId::generate())
        .await;
    h.service.recompute(h.user_id).await.unwrap();
    assert!(stored_online(&h).await);

    let transition = h
        .service
        .set_status_preference(h.user_id, StatusPreference::Offline)
        .await
        .unwrap();

    assert_eq!(transition, Some(false));
    assert!(!stored_online(&h).await);

    // 偏好切回 online 后连接还在，应当重新上线
    let transition = h
        .service
        .set_status_preference(h.user_id, StatusPreference::Online)
        .await
        .unwrap();
    assert_eq!(transition, Some(true));
}

#[tokio::test]
async fn events_for_one_user_are_published_in_order() {
    let h = harness().await;
    let conn = ConnectionId::generate();

    for _ in 0..3 {
        h.registry.add_connection(h.user_id, conn).await;
        h.service.recompute(h.user_id).await.unwrap();
        h.registry.remove_connection(h.user_id, conn).await;
        h.service.recompute(h.user_id).await.unwrap();
    }

    let events = h.broadcaster.events().await;
    assert_eq!(events.len(), 6);
    for pair in events.chunks(2) {
        assert!(pair[0].online);
        assert!(!pair[1].online);
    }
}

#[tokio::test]
async fn recompute_for_unknown_user_fails() {
    let h = harness().await;
    let missing = UserId::new(Uuid::new_v4());

    let result = h.service.recompute(missing).await;

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::UserNotFound))
    ));
    assert!(h.broadcaster.events().await.is_empty());
}

#[tokio::test]
async fn sync_swallows_errors() {
    let h = harness().await;
    // 不存在的用户不应让调用方 panic
    h.service.sync(UserId::new(Uuid::new_v4())).await;
}

#[tokio::test]
async fn lock_table_does_not_accumulate_entries() {
    let h = harness().await;
    h.registry
        .add_connection(h.user_id, ConnectionId::generate())
        .await;

    h.service.recompute(h.user_id).await.unwrap();
    h.service.recompute(h.user_id).await.unwrap();

    // 没有进行中的重算时锁表必须为空
    assert_eq!(h.service.lock_entries().await, 0);
}
