//! Update listener: narrow the inbound update stream to document uploads.
//!
//! Anything without a document attachment (text, photos, edits, joins) is
//! dropped silently. The resulting stream is lazy and as long-lived as its
//! source; for Telegram polling that is the whole process lifetime.

use crate::job::{ChatId, InboundDocument};
use futures::future;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use teloxide::types::{Message, Update, UpdateKind};
use tracing::{debug, trace};

/// A boxed stream of documents ready for the orchestrator.
pub type DocumentStream = Pin<Box<dyn Stream<Item = InboundDocument> + Send>>;

/// An inbound event that may carry a document.
pub trait InboundEvent {
    fn document(&self) -> Option<InboundDocument>;
}

impl InboundEvent for Update {
    fn document(&self) -> Option<InboundDocument> {
        match &self.kind {
            UpdateKind::Message(msg) => document_from_message(msg),
            _ => None,
        }
    }
}

/// Extract the document attachment of `msg`, if any.
pub fn document_from_message(msg: &Message) -> Option<InboundDocument> {
    let doc = msg.document()?;
    Some(InboundDocument {
        file_id: doc.file.id.to_string(),
        file_name: doc.file_name.clone().unwrap_or_default(),
        chat_id: ChatId(msg.chat.id.0),
    })
}

/// Keep only the events that carry a document.
pub fn documents<S>(events: S) -> DocumentStream
where
    S: Stream + Send + 'static,
    S::Item: InboundEvent,
{
    Box::pin(events.filter_map(|event| {
        let doc = event.document();
        match &doc {
            Some(d) => debug!("Received document '{}' from chat {}", d.file_name, d.chat_id),
            None => trace!("Ignoring update without a document"),
        }
        future::ready(doc)
    }))
}
