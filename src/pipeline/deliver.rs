//! Delivery: mail the normalised file to the configured reader address.
//!
//! Sending happens in two steps:
//!
//! 1. [`DeliveryDispatcher`] turns the raw [`MailSettings`] into an
//!    [`SmtpEndpoint`] and an [`OutboundMail`]. Every malformed setting (port,
//!    host, addresses, credentials) is reported as its own config error, and
//!    nothing has touched the network yet.
//! 2. A [`MailTransport`] dials and sends. [`SmtpMailTransport`] uses
//!    `lettre`'s blocking SMTP client on the blocking thread pool.

use crate::config::MailSettings;
use crate::error::BridgeError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Port on which the server expects TLS from the first byte.
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// MIME types for the formats `ebook-convert` writes, keyed by extension.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("epub", "application/epub+zip"),
    ("pdf", "application/pdf"),
    ("mobi", "application/x-mobipocket-ebook"),
    ("azw3", "application/vnd.amazon.ebook"),
    ("fb2", "application/x-fictionbook+xml"),
    ("rtf", "application/rtf"),
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
];
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Parsed, ready-to-dial SMTP server settings.
#[derive(Clone)]
pub struct SmtpEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl fmt::Debug for SmtpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// One outgoing message with a single file attached.
#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub from: Mailbox,
    pub to: Mailbox,
    pub subject: Option<String>,
    /// Local file to attach.
    pub attachment_path: PathBuf,
    /// Name the recipient sees.
    pub attachment_name: String,
}

/// Dials a mail server and sends one message.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, endpoint: &SmtpEndpoint, mail: OutboundMail) -> Result<(), BridgeError>;
}

/// [`MailTransport`] over SMTP with `lettre`.
///
/// Port 465 gets implicit TLS; any other port upgrades with STARTTLS when
/// the server offers it. Authentication uses the sender account.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpMailTransport;

impl SmtpMailTransport {
    fn build_message(mail: &OutboundMail, body: Vec<u8>) -> Result<Message, BridgeError> {
        let content_type = ContentType::parse(content_type_for(&mail.attachment_name))
            .map_err(|e| BridgeError::MessageBuild(e.to_string()))?;
        let attachment = Attachment::new(mail.attachment_name.clone()).body(body, content_type);

        let mut builder = Message::builder().from(mail.from.clone()).to(mail.to.clone());
        if let Some(ref subject) = mail.subject {
            builder = builder.subject(subject.clone());
        }
        builder
            .multipart(MultiPart::mixed().singlepart(attachment))
            .map_err(|e| BridgeError::MessageBuild(e.to_string()))
    }

    /// Implicit TLS on port 465, opportunistic STARTTLS everywhere else.
    fn tls_for(endpoint: &SmtpEndpoint) -> Result<Tls, BridgeError> {
        let host_ok = endpoint
            .host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']'));
        if !host_ok {
            return Err(BridgeError::InvalidHost {
                value: endpoint.host.clone(),
                reason: "not a DNS name or IP address".into(),
            });
        }

        let tls_parameters =
            TlsParameters::new(endpoint.host.clone()).map_err(|e| BridgeError::InvalidHost {
                value: endpoint.host.clone(),
                reason: e.to_string(),
            })?;
        Ok(if endpoint.port == IMPLICIT_TLS_PORT {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Opportunistic(tls_parameters)
        })
    }

    fn build_transport(endpoint: &SmtpEndpoint) -> Result<SmtpTransport, BridgeError> {
        let tls = Self::tls_for(endpoint)?;

        Ok(SmtpTransport::builder_dangerous(endpoint.host.as_str())
            .port(endpoint.port)
            .tls(tls)
            .credentials(Credentials::new(
                endpoint.username.clone(),
                endpoint.password.expose_secret().clone(),
            ))
            .build())
    }

    fn send_blocking(endpoint: &SmtpEndpoint, mail: &OutboundMail) -> Result<(), BridgeError> {
        let body = std::fs::read(&mail.attachment_path).map_err(|e| {
            BridgeError::local_io("Failed to read attachment", &mail.attachment_path, e)
        })?;
        let message = Self::build_message(mail, body)?;
        let transport = Self::build_transport(endpoint)?;

        debug!("Dialing {}:{}", endpoint.host, endpoint.port);
        transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, endpoint: &SmtpEndpoint, mail: OutboundMail) -> Result<(), BridgeError> {
        let endpoint = endpoint.clone();
        tokio::task::spawn_blocking(move || Self::send_blocking(&endpoint, &mail))
            .await
            .map_err(|e| BridgeError::Transport(format!("mail task panicked: {e}")))?
    }
}

fn content_type_for(attachment_name: &str) -> &'static str {
    let Some(ext) = Path::new(attachment_name).extension().and_then(|e| e.to_str()) else {
        return FALLBACK_CONTENT_TYPE;
    };
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map_or(FALLBACK_CONTENT_TYPE, |(_, mime)| *mime)
}

/// Builds the outbound message from configuration and hands it to the transport.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    settings: MailSettings,
    transport: Arc<dyn MailTransport>,
}

impl DeliveryDispatcher {
    pub fn new(settings: MailSettings, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    /// Mail `attachment_path` to the configured recipient as `attachment_name`.
    ///
    /// Settings are parsed first; a config error means no connection was attempted.
    pub async fn send(&self, attachment_path: &Path, attachment_name: &str) -> Result<(), BridgeError> {
        let endpoint = self.settings.endpoint()?;
        let (from, to) = self.settings.mailboxes()?;

        let mail = OutboundMail {
            from,
            to,
            subject: self.settings.subject.clone(),
            attachment_path: attachment_path.to_path_buf(),
            attachment_name: attachment_name.to_string(),
        };

        self.transport.send(&endpoint, mail).await?;
        info!("Email sent successfully");
        Ok(())
    }
}
