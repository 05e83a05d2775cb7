//! The chat platform as seen by the pipeline.

use crate::error::BridgeError;
use crate::job::ChatId;
use async_trait::async_trait;

/// File lookups and plain-text replies on the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Resolve an opaque file reference to a direct download URL.
    ///
    /// The URL may embed credentials and must not be shown to users.
    async fn resolve_file_url(&self, file_id: &str) -> Result<String, BridgeError>;

    /// Send a plain-text message to `chat_id`.
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<(), BridgeError>;
}
