//! Configuration types for the bridge.
//!
//! Everything the process needs is collected in [`BridgeConfig`], built via
//! [`BridgeConfigBuilder`]. Mail settings are kept as the raw strings the
//! operator supplied ([`MailSettings`]) and parsed when a job is delivered,
//! so a typo in `SMTP_PORT` fails that job with a readable message instead of
//! taking the bot offline.

use crate::error::BridgeError;
use crate::observer::PipelineObserver;
use crate::pipeline::deliver::SmtpEndpoint;
use crate::pipeline::fetch::DEFAULT_DOWNLOAD_TIMEOUT_SECS;
use crate::pipeline::normalize::DEFAULT_CONVERTER;
use lettre::message::Mailbox;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Extension every document is normalised to.
pub const DEFAULT_TARGET_EXTENSION: &str = "epub";

/// Long-poll timeout for `getUpdates`, in seconds.
pub const DEFAULT_POLL_TIMEOUT_SECS: u32 = 60;

/// SMTP account and destination mailbox, as supplied by the operator.
#[derive(Clone)]
pub struct MailSettings {
    /// `SMTP_HOST`
    pub host: String,
    /// `SMTP_PORT`, unparsed.
    pub port: String,
    /// `SMTP_EMAIL`: sender address and login name.
    pub from: String,
    /// `SMTP_PASSWORD`
    pub password: SecretString,
    /// `KINDLE_EMAIL`: where books are sent.
    pub to: String,
    /// Optional subject line.
    pub subject: Option<String>,
}

impl MailSettings {
    pub fn new(
        host: impl Into<String>,
        port: impl Into<String>,
        from: impl Into<String>,
        password: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            from: from.into(),
            password: SecretString::new(password.into()),
            to: to.into(),
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Parse the server part of the settings.
    pub fn endpoint(&self) -> Result<SmtpEndpoint, BridgeError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(BridgeError::InvalidHost {
                value: self.host.clone(),
                reason: "host is empty".into(),
            });
        }

        let port = parse_port(&self.port)?;

        let username = self.from.trim();
        if username.is_empty() {
            return Err(BridgeError::MissingCredential { key: "SMTP_EMAIL" });
        }
        if self.password.expose_secret().is_empty() {
            return Err(BridgeError::MissingCredential {
                key: "SMTP_PASSWORD",
            });
        }

        Ok(SmtpEndpoint {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: self.password.clone(),
        })
    }

    /// Parse sender and recipient addresses.
    pub fn mailboxes(&self) -> Result<(Mailbox, Mailbox), BridgeError> {
        Ok((
            parse_mailbox("SMTP_EMAIL", &self.from)?,
            parse_mailbox("KINDLE_EMAIL", &self.to)?,
        ))
    }
}

impl fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("from", &self.from)
            .field("password", &"[REDACTED]")
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish()
    }
}

fn parse_port(raw: &str) -> Result<u16, BridgeError> {
    let port: u16 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
        BridgeError::InvalidPort {
            value: raw.to_string(),
            reason: e.to_string(),
        }
    })?;
    if port == 0 {
        return Err(BridgeError::InvalidPort {
            value: raw.to_string(),
            reason: "port 0 is reserved".into(),
        });
    }
    Ok(port)
}

fn parse_mailbox(key: &'static str, raw: &str) -> Result<Mailbox, BridgeError> {
    raw.trim()
        .parse::<Mailbox>()
        .map_err(|e| BridgeError::InvalidAddress {
            key,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Configuration for the whole bridge process.
///
/// # Example
/// ```rust
/// use ebook_courier::{BridgeConfig, MailSettings};
///
/// let config = BridgeConfig::builder()
///     .telegram_token("123:abc")
///     .mail(MailSettings::new("smtp.example.com", "587", "me@example.com", "pw", "me@kindle.com"))
///     .workers(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.target_extension, "epub");
/// ```
#[derive(Clone)]
pub struct BridgeConfig {
    /// Bot API token.
    pub telegram_token: SecretString,

    /// Outbound mail settings.
    pub mail: MailSettings,

    /// Extension documents are converted to, without the dot. Default: `epub`.
    pub target_extension: String,

    /// Converter executable. Default: `ebook-convert` from `PATH`.
    pub converter: PathBuf,

    /// Extra arguments appended to every converter invocation.
    pub converter_args: Vec<String>,

    /// Directory for transient files. Default: the system temp directory.
    pub temp_dir: Option<PathBuf>,

    /// Jobs processed at the same time. Default: 1 (strictly one after another).
    ///
    /// Each job is still sequential internally; more workers only stop one
    /// slow conversion from holding up everybody else's documents.
    pub workers: usize,

    /// HTTP timeout for downloading a document, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Long-poll timeout for inbound updates, in seconds. Default: 60.
    pub poll_timeout_secs: u32,

    /// Optional stage/outcome observer.
    pub observer: Option<Arc<dyn PipelineObserver>>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            telegram_token: SecretString::new(String::new()),
            mail: MailSettings::new("", "", "", "", ""),
            target_extension: DEFAULT_TARGET_EXTENSION.to_string(),
            converter: PathBuf::from(DEFAULT_CONVERTER),
            converter_args: Vec::new(),
            temp_dir: None,
            workers: 1,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            observer: None,
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("telegram_token", &"[REDACTED]")
            .field("mail", &self.mail)
            .field("target_extension", &self.target_extension)
            .field("converter", &self.converter)
            .field("converter_args", &self.converter_args)
            .field("temp_dir", &self.temp_dir)
            .field("workers", &self.workers)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl BridgeConfig {
    /// Create a new builder for `BridgeConfig`.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn telegram_token(mut self, token: impl Into<String>) -> Self {
        self.config.telegram_token = SecretString::new(token.into());
        self
    }

    pub fn mail(mut self, mail: MailSettings) -> Self {
        self.config.mail = mail;
        self
    }

    pub fn target_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.target_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn converter(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.converter = program.into();
        self
    }

    pub fn converter_args(mut self, args: Vec<String>) -> Self {
        self.config.converter_args = args;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn poll_timeout_secs(mut self, secs: u32) -> Self {
        self.config.poll_timeout_secs = secs;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BridgeConfig, BridgeError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(BridgeError::InvalidConfig("workers must be ≥ 1".into()));
        }
        let ext_ok = !c.target_extension.is_empty()
            && c.target_extension.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !ext_ok {
            return Err(BridgeError::InvalidConfig(format!(
                "target format must be a plain extension like 'epub', got '{}'",
                c.target_extension
            )));
        }
        if c.download_timeout_secs == 0 {
            return Err(BridgeError::InvalidConfig(
                "download timeout must be at least one second".into(),
            ));
        }
        Ok(self.config)
    }
}
