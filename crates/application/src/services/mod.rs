pub mod notification_service;
pub mod presence_service;

pub use notification_service::{NotificationService, NotificationServiceDependencies};
pub use presence_service::{PresenceService, PresenceServiceDependencies};

#[cfg(test)]
mod presence_service_tests;
