//! Pipeline stages for document delivery.
//!
//! Each submodule implements one step of a job. The orchestrator in
//! [`crate::orchestrator`] sequences them and owns the failure policy.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ normalize ──▶ deliver
//! (HTTP)    (converter)   (SMTP)
//!    └──────────┴────────────┴──▶ notify (chat)
//! ```
//!
//! 1. [`fetch`] resolves the file URL and downloads it into a transient file
//! 2. [`normalize`] skips or runs the external converter to reach the target format
//! 3. [`deliver`] parses mail settings and sends the file over SMTP
//! 4. [`notify`] sends best-effort status messages back to the requester

pub mod deliver;
pub mod fetch;
pub mod normalize;
pub mod notify;
