//! Telegram Bot API backend for [`ChatPlatform`] and the inbound update stream.

use crate::error::BridgeError;
use crate::job::ChatId;
use crate::platform::ChatPlatform;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use secrecy::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, Update};
use tracing::{debug, info, warn};

/// Telegram refuses messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Pause after a failed `getUpdates` call before polling again.
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

/// Extra HTTP headroom on top of the long-poll timeout so the client does not
/// abort a request Telegram is still legitimately holding open.
const CLIENT_TIMEOUT_MARGIN_SECS: u64 = 15;

/// A boxed, never-ending stream of raw updates.
pub type UpdateStream = Pin<Box<dyn Stream<Item = Update> + Send>>;

/// Bot API client used for polling, file lookups and replies.
#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
    poll_timeout_secs: u32,
}

impl TelegramPlatform {
    pub fn new(token: &SecretString, poll_timeout_secs: u32) -> Result<Self, BridgeError> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(
                u64::from(poll_timeout_secs) + CLIENT_TIMEOUT_MARGIN_SECS,
            ))
            .build()
            .map_err(|e| BridgeError::ClientSetup {
                client: "telegram",
                reason: e.to_string(),
            })?;
        Ok(Self {
            bot: Bot::with_client(token.expose_secret(), client),
            poll_timeout_secs,
        })
    }

    /// Verify the token with `getMe` and return the bot's username.
    pub async fn authorize(&self) -> Result<String, BridgeError> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| BridgeError::Unauthorized(e.to_string()))?;
        let username = me.username.clone().unwrap_or_default();
        info!("Authorized on account {}", username);
        Ok(username)
    }

    /// Long-poll `getUpdates` forever, yielding message updates in order.
    ///
    /// Polling errors are logged and retried after a short pause; the stream
    /// itself never ends.
    pub fn updates(&self) -> UpdateStream {
        let state = (self.bot.clone(), 0i32, VecDeque::new());
        let timeout = self.poll_timeout_secs;

        Box::pin(stream::unfold(state, move |(bot, mut offset, mut pending)| async move {
            loop {
                if let Some(update) = pending.pop_front() {
                    return Some((update, (bot, offset, pending)));
                }

                match bot
                    .get_updates()
                    .offset(offset)
                    .timeout(timeout)
                    .allowed_updates(vec![AllowedUpdate::Message])
                    .await
                {
                    Ok(batch) => {
                        debug!("Got {} telegram update(s)", batch.len());
                        for update in batch {
                            offset = update.id.as_offset();
                            pending.push_back(update);
                        }
                    }
                    Err(e) => {
                        warn!("Failed to poll telegram updates: {}", e);
                        tokio::time::sleep(POLL_ERROR_DELAY).await;
                    }
                }
            }
        }))
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn resolve_file_url(&self, file_id: &str) -> Result<String, BridgeError> {
        let file = self
            .bot
            .get_file(file_id.to_string())
            .await
            .map_err(|e| BridgeError::ResolveFailed {
                file_id: file_id.to_string(),
                reason: e.to_string(),
            })?;

        // https://api.telegram.org/file/bot<token>/<file_path>
        Ok(format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot.token(),
            file.path
        ))
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<(), BridgeError> {
        self.bot
            .send_message(teloxide::types::ChatId(chat_id.0), truncate_message(text))
            .await
            .map(|_| ())
            .map_err(|e| BridgeError::NotifyFailed {
                chat_id: chat_id.0,
                reason: e.to_string(),
            })
    }
}

/// Cut `text` to the Telegram limit on a character boundary.
pub fn truncate_message(text: &str) -> String {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((cut, _)) => {
            let mut end = cut;
            // Leave room for the ellipsis.
            if let Some((prev, _)) = text[..cut].char_indices().next_back() {
                end = prev;
            }
            format!("{}\u{2026}", &text[..end])
        }
        None => text.to_string(),
    }
}
