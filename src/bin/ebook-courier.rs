//! CLI binary for ebook-courier.
//!
//! Reads settings from flags, the environment and an optional `.env` file,
//! then runs the bot until the update stream ends or Ctrl-C arrives.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ebook_courier::{
    documents, BridgeConfig, Collaborators, Converter, EbookConvert, HttpDownloader, MailSettings,
    Pipeline, SmtpMailTransport, TelegramPlatform, TransientStore,
};
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Everything from the environment (or a .env file in the working directory)
  ebook-courier

  # Explicit env file, two books converted at a time
  ebook-courier --env-file /etc/ebook-courier.env --workers 2

  # Deliver PDFs untouched and MOBI/AZW3 converted to PDF instead of EPUB
  ebook-courier --target-format pdf

ENVIRONMENT VARIABLES:
  TELEGRAM_API_TOKEN      Bot API token (required)
  SMTP_HOST               Outgoing mail server host
  SMTP_PORT               Outgoing mail server port (465 uses implicit TLS)
  SMTP_EMAIL              Sender address, also the SMTP user name
  SMTP_PASSWORD           SMTP password
  KINDLE_EMAIL            Recipient address
  COURIER_MAIL_SUBJECT    Subject line (default: empty)

  Mail settings are checked per book: a typo in SMTP_PORT is reported in
  the chat when a book arrives, not at startup.

SETUP:
  1. Install calibre so `ebook-convert` is on PATH.
  2. Add SMTP_EMAIL to your Kindle's approved sender list.
  3. Send a book to the bot.
"#;

/// Forward ebooks sent to a Telegram bot to an e-reader by email.
#[derive(Parser, Debug)]
#[command(
    name = "ebook-courier",
    version,
    about = "Forward ebooks sent to a Telegram bot to an e-reader by email",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Bot API token.
    #[arg(long, env = "TELEGRAM_API_TOKEN", hide_env_values = true)]
    telegram_token: String,

    /// SMTP server host.
    #[arg(long, env = "SMTP_HOST", default_value = "")]
    smtp_host: String,

    /// SMTP server port, kept as text and validated per delivery.
    #[arg(long, env = "SMTP_PORT", default_value = "")]
    smtp_port: String,

    /// Sender address and SMTP user name.
    #[arg(long, env = "SMTP_EMAIL", default_value = "")]
    smtp_email: String,

    /// SMTP password.
    #[arg(long, env = "SMTP_PASSWORD", default_value = "", hide_env_values = true)]
    smtp_password: String,

    /// Recipient address.
    #[arg(long, env = "KINDLE_EMAIL", default_value = "")]
    kindle_email: String,

    /// Mail subject line.
    #[arg(long, env = "COURIER_MAIL_SUBJECT")]
    subject: Option<String>,

    /// Extension books are delivered in.
    #[arg(long, env = "COURIER_TARGET_FORMAT", default_value = "epub")]
    target_format: String,

    /// Converter executable.
    #[arg(long, env = "COURIER_CONVERTER", default_value = "ebook-convert")]
    converter: PathBuf,

    /// Extra converter arguments, whitespace separated.
    #[arg(long, env = "COURIER_CONVERTER_ARGS", allow_hyphen_values = true)]
    converter_args: Option<String>,

    /// Directory for transient files (created if missing).
    #[arg(long, env = "COURIER_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Books processed at the same time.
    #[arg(short, long, env = "COURIER_WORKERS", default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..))]
    workers: u16,

    /// Document download timeout in seconds.
    #[arg(long, env = "COURIER_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Telegram long-poll timeout in seconds.
    #[arg(long, env = "COURIER_POLL_TIMEOUT", default_value_t = 60)]
    poll_timeout: u32,

    /// Load environment variables from this file instead of `./.env`.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Log format.
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Env-backed flags are resolved during parsing, so the file goes first.
    match env_file_arg(std::env::args_os()) {
        Some(path) => {
            dotenvy::from_path(&path)
                .with_context(|| format!("Failed to load env file {:?}", path))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let cli = Cli::parse();
    init_logging(&cli);

    let config = build_config(&cli).context("Invalid configuration")?;

    let store = match &config.temp_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create temp dir {:?}", dir))?;
            TransientStore::new(dir)
        }
        None => TransientStore::in_system_temp(),
    };

    let telegram = TelegramPlatform::new(&config.telegram_token, config.poll_timeout_secs)
        .context("Failed to set up the Telegram client")?;
    telegram
        .authorize()
        .await
        .context("Failed to authorize with Telegram")?;

    let converter =
        EbookConvert::new(&config.converter).with_extra_args(config.converter_args.clone());
    if let Err(e) = converter.validate().await {
        warn!("{}; only .{} books can be delivered", e, config.target_extension);
    }

    let collaborators = Collaborators {
        platform: Arc::new(telegram.clone()),
        downloader: Arc::new(
            HttpDownloader::new(config.download_timeout_secs)
                .context("Failed to set up the download client")?,
        ),
        converter: Arc::new(converter),
        transport: Arc::new(SmtpMailTransport),
    };
    let pipeline = Pipeline::new(&config, store, collaborators);

    tokio::select! {
        _ = pipeline.run(documents(telegram.updates())) => {
            info!("Update stream closed, exiting");
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Interrupted, shutting down"),
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init(),
    }
}

/// Map CLI args to `BridgeConfig`.
fn build_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut mail = MailSettings::new(
        &cli.smtp_host,
        &cli.smtp_port,
        &cli.smtp_email,
        &cli.smtp_password,
        &cli.kindle_email,
    );
    if let Some(subject) = &cli.subject {
        mail = mail.with_subject(subject);
    }

    let converter_args = cli
        .converter_args
        .as_deref()
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let mut builder = BridgeConfig::builder()
        .telegram_token(&cli.telegram_token)
        .mail(mail)
        .target_extension(&cli.target_format)
        .converter(&cli.converter)
        .converter_args(converter_args)
        .workers(usize::from(cli.workers))
        .download_timeout_secs(cli.download_timeout)
        .poll_timeout_secs(cli.poll_timeout);
    if let Some(dir) = &cli.temp_dir {
        builder = builder.temp_dir(dir);
    }

    Ok(builder.build()?)
}

/// Find `--env-file <path>` or `--env-file=<path>` ahead of full parsing.
fn env_file_arg(args: impl IntoIterator<Item = OsString>) -> Option<PathBuf> {
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        let arg = arg.to_string_lossy().into_owned();
        if arg == "--env-file" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--env-file=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}
