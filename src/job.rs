//! Data model for a single delivery job.

use crate::error::JobFailure;
use std::fmt;

/// Identifier of the chat a document came from; replies go back here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document attachment picked out of the inbound update stream.
///
/// Immutable; lives for exactly one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDocument {
    /// Opaque platform file reference.
    pub file_id: String,
    /// Original file name as uploaded. Its extension drives conversion.
    pub file_name: String,
    /// Requester.
    pub chat_id: ChatId,
}

/// An outbound status line for the requester. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub chat_id: ChatId,
    pub text: String,
}

impl StatusEvent {
    pub fn new(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
        }
    }
}

/// A non-terminal phase of the job state machine.
///
/// `Done` and `Failed` are represented by [`JobOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetching,
    Converting,
    Sending,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetching => "fetching",
            Stage::Converting => "converting",
            Stage::Sending => "sending",
        })
    }
}

/// Terminal state of a job.
#[derive(Debug)]
pub enum JobOutcome {
    /// The attachment was handed to the mail transport.
    Delivered {
        /// File name the recipient sees.
        attachment_name: String,
        /// False when the upload was already in the target format.
        converted: bool,
    },
    /// The job stopped at `failure.stage`.
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, JobOutcome::Delivered { .. })
    }

    /// The failure, if the job did not complete.
    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            JobOutcome::Failed(f) => Some(f),
            JobOutcome::Delivered { .. } => None,
        }
    }
}
