//! Observer hook for per-job pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::BridgeConfigBuilder::observer`] to see each job move
//! through its stages. The chat notifications are the user-facing channel;
//! this hook is for the host process (metrics, audit logs, tests).
//!
//! ```rust
//! use ebook_courier::{InboundDocument, JobOutcome, PipelineObserver};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct Delivered(AtomicUsize);
//!
//! impl PipelineObserver for Delivered {
//!     fn on_job_complete(&self, _doc: &InboundDocument, outcome: &JobOutcome) {
//!         if outcome.is_delivered() {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use crate::job::{InboundDocument, JobOutcome, Stage};
use std::sync::Arc;

/// Called by the orchestrator as a job progresses.
///
/// With more than one worker, calls for different jobs may arrive
/// concurrently from different threads. All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    /// A job was accepted.
    fn on_job_start(&self, doc: &InboundDocument) {
        let _ = doc;
    }

    /// A stage is about to run. Skipped stages are not reported.
    fn on_stage_start(&self, doc: &InboundDocument, stage: Stage) {
        let _ = (doc, stage);
    }

    /// The job reached `Done` or `Failed`, after its transient files were released.
    fn on_job_complete(&self, doc: &InboundDocument, outcome: &JobOutcome) {
        let _ = (doc, outcome);
    }
}

/// Observer that ignores every event. Used when none is configured.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::BridgeConfig`].
pub type ObserverHandle = Arc<dyn PipelineObserver>;
