use std::sync::Arc;

use application::{ConnectionRegistry, NotificationService, PresenceService};
use infrastructure::LocalPresenceBroadcaster;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub presence_service: Arc<PresenceService>,
    pub notification_service: Arc<NotificationService>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: LocalPresenceBroadcaster,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        presence_service: Arc<PresenceService>,
        notification_service: Arc<NotificationService>,
        registry: Arc<ConnectionRegistry>,
        broadcaster: LocalPresenceBroadcaster,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            presence_service,
            notification_service,
            registry,
            broadcaster,
            jwt_service,
        }
    }
}
