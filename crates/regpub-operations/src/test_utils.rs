use std::sync::Mutex;

use regpub_core::error::{PublishError, PublishResult};

use crate::notifications::{Notification, Notifier};

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_error(&self, notification: &Notification) -> PublishResult<()> {
        if self.fail {
            return Err(PublishError::Custom("smtp down".into()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
