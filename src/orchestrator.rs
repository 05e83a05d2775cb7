//! Pipeline orchestration: one inbound document in, one chat reply out.
//!
//! Each job runs `Fetching → Converting (skippable) → Sending`, ending in
//! `Done` or `Failed`. A failing stage stops the job. The requester gets
//! exactly one outcome message, and every transient file the job created
//! is released before the next event for this worker is taken.
//!
//! [`Pipeline::run`] drains a document stream with up to `workers` jobs in
//! flight. One worker reproduces a strictly serial bot.

use crate::config::BridgeConfig;
use crate::error::JobFailure;
use crate::job::{InboundDocument, JobOutcome, Stage, StatusEvent};
use crate::observer::{NoopObserver, ObserverHandle};
use crate::pipeline::deliver::{DeliveryDispatcher, MailTransport};
use crate::pipeline::fetch::{fetch_document, Downloader};
use crate::pipeline::normalize::{replace_extension, Converter, FormatNormalizer};
use crate::pipeline::notify::Notifier;
use crate::platform::ChatPlatform;
use crate::store::{TransientFile, TransientStore};
use futures::{Stream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sent just before the mail transport is dialled.
pub const SENDING_MESSAGE: &str = "Sending the book to your kindle...";

/// Sent when the mail was accepted.
pub const SUCCESS_MESSAGE: &str = "Email sent successfully!";

/// The external capabilities a [`Pipeline`] drives.
#[derive(Clone)]
pub struct Collaborators {
    pub platform: Arc<dyn ChatPlatform>,
    pub downloader: Arc<dyn Downloader>,
    pub converter: Arc<dyn Converter>,
    pub transport: Arc<dyn MailTransport>,
}

/// Transient files owned by one job.
struct Job {
    source: Option<TransientFile>,
    target: Option<TransientFile>,
}

impl Job {
    fn new() -> Self {
        Self {
            source: None,
            target: None,
        }
    }

    fn release(self) {
        if let Some(target) = self.target {
            target.release();
        }
        if let Some(source) = self.source {
            source.release();
        }
    }
}

/// Runs the delivery state machine for each inbound document.
#[derive(Clone)]
pub struct Pipeline {
    store: TransientStore,
    platform: Arc<dyn ChatPlatform>,
    downloader: Arc<dyn Downloader>,
    normalizer: FormatNormalizer,
    dispatcher: DeliveryDispatcher,
    notifier: Notifier,
    observer: ObserverHandle,
    workers: usize,
}

impl Pipeline {
    pub fn new(config: &BridgeConfig, store: TransientStore, collaborators: Collaborators) -> Self {
        let Collaborators {
            platform,
            downloader,
            converter,
            transport,
        } = collaborators;

        Self {
            store,
            notifier: Notifier::new(Arc::clone(&platform)),
            platform,
            downloader,
            normalizer: FormatNormalizer::new(converter, config.target_extension.clone()),
            dispatcher: DeliveryDispatcher::new(config.mail.clone(), transport),
            observer: config
                .observer
                .clone()
                .unwrap_or_else(|| Arc::new(NoopObserver)),
            workers: config.workers.max(1),
        }
    }

    pub fn store(&self) -> &TransientStore {
        &self.store
    }

    /// Consume `documents` until the stream ends, `workers` jobs at a time.
    pub async fn run<S>(&self, documents: S)
    where
        S: Stream<Item = InboundDocument>,
    {
        info!("Pipeline accepting documents ({} worker(s))", self.workers);
        documents
            .for_each_concurrent(self.workers, |doc| async move {
                self.process(doc).await;
            })
            .await;
        info!("Document stream ended");
    }

    /// Run one job to completion and report its outcome to the requester.
    pub async fn process(&self, doc: InboundDocument) -> JobOutcome {
        let start = Instant::now();
        info!("Processing '{}' from chat {}", doc.file_name, doc.chat_id);
        self.observer.on_job_start(&doc);

        let mut job = Job::new();
        let outcome = match self.run_stages(&doc, &mut job).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                warn!(
                    "Job for '{}' failed while {}: {}",
                    doc.file_name, failure.stage, failure.error
                );
                JobOutcome::Failed(failure)
            }
        };

        let reply = match &outcome {
            JobOutcome::Delivered { .. } => SUCCESS_MESSAGE.to_string(),
            JobOutcome::Failed(failure) => failure.chat_message(self.normalizer.target_extension()),
        };
        self.notifier.relay(StatusEvent::new(doc.chat_id, reply)).await;

        job.release();
        debug!(
            "Job for '{}' finished in {}ms",
            doc.file_name,
            start.elapsed().as_millis()
        );
        self.observer.on_job_complete(&doc, &outcome);
        outcome
    }

    async fn run_stages(&self, doc: &InboundDocument, job: &mut Job) -> Result<JobOutcome, JobFailure> {
        // ── Stage 1: Fetching ────────────────────────────────────────────────
        self.observer.on_stage_start(doc, Stage::Fetching);
        let fetched = fetch_document(
            self.platform.as_ref(),
            self.downloader.as_ref(),
            &self.store,
            doc,
        )
        .await
        .map_err(|e| JobFailure::new(Stage::Fetching, e))?;
        let source: &TransientFile = job.source.insert(fetched);

        // ── Stage 2: Converting ──────────────────────────────────────────────
        let converted = self.normalizer.needs_conversion(source.path());
        if converted {
            self.observer.on_stage_start(doc, Stage::Converting);
            let target = self
                .normalizer
                .convert(&self.store, source)
                .await
                .map_err(|e| JobFailure::new(Stage::Converting, e))?;
            job.target = Some(target);
        } else {
            debug!(
                "'{}' is already .{}; skipping conversion",
                doc.file_name,
                self.normalizer.target_extension()
            );
        }
        let attachment: &Path = job.target.as_ref().unwrap_or(source).path();

        // ── Stage 3: Sending ─────────────────────────────────────────────────
        self.observer.on_stage_start(doc, Stage::Sending);
        self.notifier
            .relay(StatusEvent::new(doc.chat_id, SENDING_MESSAGE))
            .await;

        let attachment_name = replace_extension(&doc.file_name, self.normalizer.target_extension());
        self.dispatcher
            .send(attachment, &attachment_name)
            .await
            .map_err(|e| JobFailure::new(Stage::Sending, e))?;

        Ok(JobOutcome::Delivered {
            attachment_name,
            converted,
        })
    }
}
