//! 进程内在线状态广播。
//!
//! 单条 tokio broadcast 通道发布全部在线状态事件，每个 WebSocket
//! 连接持有一个接收端。通道的发布顺序天然保证了同一用户事件的
//! 观察顺序；落后的接收端直接丢事件，不补发。

use application::{BroadcastError, PresenceBroadcaster, PresenceUpdate};
use async_trait::async_trait;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct LocalPresenceBroadcaster {
    sender: broadcast::Sender<PresenceUpdate>,
}

impl LocalPresenceBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceUpdate> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl PresenceBroadcaster for LocalPresenceBroadcaster {
    async fn publish(&self, update: PresenceUpdate) -> Result<(), BroadcastError> {
        // 没有任何接收端时 send 会报错，这不算失败
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(update)
            .map_err(|err| BroadcastError::failed(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::UserId;
    use uuid::Uuid;

    #[tokio::test]
    async fn every_subscriber_observes_the_event() {
        let broadcaster = LocalPresenceBroadcaster::new(16);
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        let update = PresenceUpdate {
            user_id: UserId::new(Uuid::new_v4()),
            online: true,
        };
        broadcaster.publish(update).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), update);
        assert_eq!(second.recv().await.unwrap(), update);
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let broadcaster = LocalPresenceBroadcaster::new(16);
        let mut receiver = broadcaster.subscribe();
        let user_id = UserId::new(Uuid::new_v4());

        for online in [true, false, true] {
            broadcaster
                .publish(PresenceUpdate { user_id, online })
                .await
                .unwrap();
        }

        assert!(receiver.recv().await.unwrap().online);
        assert!(!receiver.recv().await.unwrap().online);
        assert!(receiver.recv().await.unwrap().online);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let broadcaster = LocalPresenceBroadcaster::new(16);
        broadcaster
            .publish(PresenceUpdate {
                user_id: UserId::new(Uuid::new_v4()),
                online: false,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let broadcaster = LocalPresenceBroadcaster::new(16);
        let user_id = UserId::new(Uuid::new_v4());
        broadcaster
            .publish(PresenceUpdate {
                user_id,
                online: true,
            })
            .await
            .unwrap();

        let mut late = broadcaster.subscribe();
        broadcaster
            .publish(PresenceUpdate {
                user_id,
                online: false,
            })
            .await
            .unwrap();

        // 订阅之前的事件直接错过
        let received = late.recv().await.unwrap();
        assert!(!received.online);
        assert!(late.try_recv().is_err());
    }
}
