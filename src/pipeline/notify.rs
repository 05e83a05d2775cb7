//! Notifier: status and error messages back to the requesting chat.
//!
//! Notifications are best-effort. [`Notifier::relay`] logs a failed send and
//! returns normally, so a broken chat connection never replaces the job's
//! real error with a notification error.

use crate::error::BridgeError;
use crate::job::{ChatId, StatusEvent};
use crate::platform::ChatPlatform;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone)]
pub struct Notifier {
    platform: Arc<dyn ChatPlatform>,
}

impl Notifier {
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        Self { platform }
    }

    /// Send `text` to `chat_id`, reporting failure to the caller.
    pub async fn notify(&self, chat_id: ChatId, text: &str) -> Result<(), BridgeError> {
        self.platform.send_message(chat_id, text).await
    }

    /// Send a status event; failures are logged and swallowed.
    ///
    /// Returns whether the message went out.
    pub async fn relay(&self, event: StatusEvent) -> bool {
        match self.notify(event.chat_id, &event.text).await {
            Ok(()) => {
                debug!("Notified chat {}: {}", event.chat_id, event.text);
                true
            }
            Err(e) => {
                error!("Failed to send a message {}", e);
                false
            }
        }
    }
}
