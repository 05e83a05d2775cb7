//! # ebook-courier
//!
//! Forward ebooks sent to a Telegram bot to an e-reader's mail inbox.
//!
//! A user drops a document into the bot chat. The bridge downloads it,
//! converts it to the reader's format with calibre's `ebook-convert` when
//! needed, mails it as an attachment over SMTP, and replies in the chat with
//! the outcome.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Telegram update
//!  │
//!  ├─ 1. Listen   keep only messages carrying a document
//!  ├─ 2. Fetch    resolve the file URL and stream it into a transient file
//!  ├─ 3. Convert  skipped when the file already has the target extension
//!  ├─ 4. Send     SMTP mail with the book attached (spawn_blocking)
//!  └─ 5. Notify   one outcome message back to the chat
//! ```
//!
//! Every transient file a job creates is deleted when the job ends, whether
//! it succeeded or not.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ebook_courier::{
//!     documents, BridgeConfig, Collaborators, EbookConvert, HttpDownloader, MailSettings,
//!     Pipeline, SmtpMailTransport, TelegramPlatform, TransientStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BridgeConfig::builder()
//!         .telegram_token("123456:ABC")
//!         .mail(MailSettings::new("smtp.example.com", "587", "me@example.com", "pw", "me@kindle.com"))
//!         .build()?;
//!
//!     let telegram = TelegramPlatform::new(&config.telegram_token, config.poll_timeout_secs)?;
//!     telegram.authorize().await?;
//!
//!     let pipeline = Pipeline::new(
//!         &config,
//!         TransientStore::in_system_temp(),
//!         Collaborators {
//!             platform: Arc::new(telegram.clone()),
//!             downloader: Arc::new(HttpDownloader::new(config.download_timeout_secs)?),
//!             converter: Arc::new(EbookConvert::default()),
//!             transport: Arc::new(SmtpMailTransport),
//!         },
//!     );
//!     pipeline.run(documents(telegram.updates())).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ebook-courier` binary (clap + anyhow + dotenvy + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod listener;
pub mod observer;
pub mod orchestrator;
pub mod pipeline;
pub mod platform;
pub mod store;
pub mod telegram;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BridgeConfig, BridgeConfigBuilder, MailSettings};
pub use error::{BridgeError, ErrorKind, JobFailure};
pub use job::{ChatId, InboundDocument, JobOutcome, Stage, StatusEvent};
pub use listener::{documents, DocumentStream, InboundEvent};
pub use observer::{NoopObserver, PipelineObserver};
pub use orchestrator::{Collaborators, Pipeline};
pub use pipeline::deliver::{MailTransport, SmtpMailTransport};
pub use pipeline::fetch::{Downloader, HttpDownloader};
pub use pipeline::normalize::{Converter, EbookConvert};
pub use platform::ChatPlatform;
pub use store::{TransientFile, TransientStore};
pub use telegram::TelegramPlatform;
