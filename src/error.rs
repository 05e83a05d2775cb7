//! Error types for the ebook-courier library.
//!
//! Two layers of error reflect two audiences:
//!
//! * [`BridgeError`]: what went wrong, in terms of the collaborator that
//!   failed (chat platform, local disk, converter, mail settings, SMTP).
//!   Every stage returns `Result<_, BridgeError>`.
//!
//! * [`JobFailure`]: a `BridgeError` pinned to the [`Stage`] it happened in.
//!   This is what the orchestrator turns into the single chat message the
//!   requester receives for a failed job.

use crate::job::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// URL resolution or download failure.
    Fetch,
    /// Temp file create/write/delete failure.
    LocalIo,
    /// External converter failure.
    Conversion,
    /// Malformed mail transport configuration.
    Config,
    /// SMTP dial or send failure.
    Delivery,
    /// Status message could not be delivered to the chat.
    Notify,
    /// Process-level failure while starting up.
    Startup,
}

/// All errors produced by the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Fetch errors ──────────────────────────────────────────────────────
    /// The chat platform could not resolve a download URL for the file.
    #[error("could not resolve file '{file_id}': {reason}")]
    ResolveFailed { file_id: String, reason: String },

    /// The HTTP download failed or returned a non-success status.
    #[error("{reason}")]
    DownloadFailed { reason: String },

    /// The download exceeded the configured timeout.
    #[error("download timed out after {secs}s")]
    DownloadTimeout { secs: u64 },

    // ── Local I/O errors ──────────────────────────────────────────────────
    /// Creating or writing a transient file failed.
    #[error("{context} '{path}': {source}")]
    LocalIo {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The converter executable could not be started.
    #[error("converter '{program}' could not be started: {source}")]
    ConverterUnavailable {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The converter ran but reported failure.
    ///
    /// `diagnostic` is the tool's own output, passed through untouched.
    #[error("{reason}{}", trailing_diagnostic(.diagnostic))]
    ConversionFailed {
        reason: String,
        diagnostic: Option<String>,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// SMTP port is not a number in 1–65535.
    #[error("SMTP_PORT '{value}' is not a valid port: {reason}")]
    InvalidPort { value: String, reason: String },

    /// SMTP host is empty or cannot be used as a TLS server name.
    #[error("SMTP_HOST '{value}' is not usable: {reason}")]
    InvalidHost { value: String, reason: String },

    /// A configured mailbox does not parse as an email address.
    #[error("{key} '{value}' is not a valid address: {reason}")]
    InvalidAddress {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// A required credential is empty.
    #[error("{key} is not set")]
    MissingCredential { key: &'static str },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Delivery errors ───────────────────────────────────────────────────
    /// The message could not be assembled.
    #[error("could not build the message: {0}")]
    MessageBuild(String),

    /// SMTP handshake or send failed.
    #[error("{0}")]
    Transport(String),

    // ── Notify errors ─────────────────────────────────────────────────────
    /// A status message could not be sent to the chat.
    #[error("could not send message to chat {chat_id}: {reason}")]
    NotifyFailed { chat_id: i64, reason: String },

    // ── Startup errors ────────────────────────────────────────────────────
    /// The chat platform rejected the bot credentials.
    #[error("Telegram authorization failed: {0}")]
    Unauthorized(String),

    /// An HTTP client could not be constructed.
    #[error("could not set up the {client} HTTP client: {reason}")]
    ClientSetup { client: &'static str, reason: String },
}

impl BridgeError {
    /// Classify this error into its taxonomy kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResolveFailed { .. } | Self::DownloadFailed { .. } | Self::DownloadTimeout { .. } => {
                ErrorKind::Fetch
            }
            Self::LocalIo { .. } => ErrorKind::LocalIo,
            Self::ConverterUnavailable { .. } | Self::ConversionFailed { .. } => ErrorKind::Conversion,
            Self::InvalidPort { .. }
            | Self::InvalidHost { .. }
            | Self::InvalidAddress { .. }
            | Self::MissingCredential { .. }
            | Self::InvalidConfig(_) => ErrorKind::Config,
            Self::MessageBuild(_) | Self::Transport(_) => ErrorKind::Delivery,
            Self::NotifyFailed { .. } => ErrorKind::Notify,
            Self::Unauthorized(_) | Self::ClientSetup { .. } => ErrorKind::Startup,
        }
    }

    pub(crate) fn local_io(
        context: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::LocalIo {
            context,
            path: path.into(),
            source,
        }
    }
}

fn trailing_diagnostic(diagnostic: &Option<String>) -> String {
    diagnostic
        .as_deref()
        .map(|d| format!("\n{d}"))
        .unwrap_or_default()
}

/// A job-terminating error together with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct JobFailure {
    pub stage: Stage,
    #[source]
    pub error: BridgeError,
}

impl JobFailure {
    pub fn new(stage: Stage, error: BridgeError) -> Self {
        Self { stage, error }
    }

    /// The one message the requester sees for this failure.
    ///
    /// `target_extension` names the format in the conversion message.
    pub fn chat_message(&self, target_extension: &str) -> String {
        match (self.stage, self.error.kind()) {
            (Stage::Fetching, _) => {
                format!("Failed to download the file from telegram: {}", self.error)
            }
            (Stage::Converting, _) => format!(
                "Failed to convert the book to {}: {}",
                target_extension, self.error
            ),
            (Stage::Sending, ErrorKind::Config) => {
                format!("Mail settings are invalid: {}", self.error)
            }
            (Stage::Sending, _) => format!("Failed to send the letter: {}", self.error),
        }
    }
}
