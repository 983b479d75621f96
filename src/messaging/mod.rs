// Messaging - User-visible notifications sent from the controller to a UI

pub mod channels;
pub mod notification;

pub use channels::{NotificationConsumer, NotificationProducer, create_notification_channel};
pub use notification::{Notification, NotificationCategory, NotificationLevel};
