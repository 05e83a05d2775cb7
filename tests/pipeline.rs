//! Pipeline integration tests.
//!
//! Every external collaborator is replaced by an in-memory fake, so these
//! run offline and without calibre installed. Transient files live in a
//! per-test temp directory that must be empty again once a job ends.

use async_trait::async_trait;
use ebook_courier::orchestrator::{SENDING_MESSAGE, SUCCESS_MESSAGE};
use ebook_courier::pipeline::deliver::{OutboundMail, SmtpEndpoint};
use ebook_courier::{
    BridgeConfig, BridgeError, ChatId, ChatPlatform, Collaborators, Converter, Downloader,
    ErrorKind, InboundDocument, JobOutcome, MailSettings, MailTransport, Pipeline,
    PipelineObserver, Stage, TransientStore,
};
use futures::stream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const BOOK_BYTES: &[u8] = b"PK\x03\x04 not really a book";
const CONVERTED_BYTES: &[u8] = b"converted epub";

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakePlatform {
    fail_resolve: bool,
    fail_send: bool,
    messages: Mutex<Vec<(ChatId, String)>>,
}

impl FakePlatform {
    fn texts(&self) -> Vec<String> {
        self.messages.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn resolve_file_url(&self, file_id: &str) -> Result<String, BridgeError> {
        if self.fail_resolve {
            return Err(BridgeError::ResolveFailed {
                file_id: file_id.to_string(),
                reason: "Bad Request: invalid file_id".into(),
            });
        }
        Ok(format!("https://files.test/{file_id}"))
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<(), BridgeError> {
        self.messages.lock().unwrap().push((chat_id, text.to_string()));
        if self.fail_send {
            return Err(BridgeError::NotifyFailed {
                chat_id: chat_id.0,
                reason: "Forbidden: bot was blocked by the user".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeDownloader {
    fail: bool,
    calls: AtomicUsize,
    dests: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, _url: &str, dest: &Path) -> Result<u64, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.dests.lock().unwrap().push(dest.to_path_buf());
        if self.fail {
            return Err(BridgeError::DownloadFailed {
                reason: "HTTP status server error (502 Bad Gateway)".into(),
            });
        }
        tokio::fs::write(dest, BOOK_BYTES).await.unwrap();
        Ok(BOOK_BYTES.len() as u64)
    }
}

#[derive(Default)]
struct FakeConverter {
    fail: bool,
    hang: bool,
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

#[async_trait]
impl Converter for FakeConverter {
    fn name(&self) -> &str {
        "fake"
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<(), BridgeError> {
        assert!(input.exists(), "converter input must exist");
        self.calls
            .lock()
            .unwrap()
            .push((input.to_path_buf(), output.to_path_buf()));
        if self.hang {
            futures::future::pending::<()>().await;
        }
        if self.fail {
            return Err(BridgeError::ConversionFailed {
                reason: "exit status: 1".into(),
                diagnostic: Some("Unknown input format".into()),
            });
        }
        tokio::fs::write(output, CONVERTED_BYTES).await.unwrap();
        Ok(())
    }

    async fn validate(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeTransport {
    fail: bool,
    sent: Mutex<Vec<(SmtpEndpoint, OutboundMail, Vec<u8>)>>,
}

impl FakeTransport {
    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn send(&self, endpoint: &SmtpEndpoint, mail: OutboundMail) -> Result<(), BridgeError> {
        let body = tokio::fs::read(&mail.attachment_path)
            .await
            .expect("attachment must exist while sending");
        self.sent.lock().unwrap().push((endpoint.clone(), mail, body));
        if self.fail {
            return Err(BridgeError::Transport("Connection refused (os error 111)".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingObserver {
    stages: Mutex<Vec<Stage>>,
    completed: AtomicUsize,
}

impl PipelineObserver for RecordingObserver {
    fn on_stage_start(&self, _doc: &InboundDocument, stage: Stage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_job_complete(&self, _doc: &InboundDocument, _outcome: &JobOutcome) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    pipeline: Pipeline,
    platform: Arc<FakePlatform>,
    downloader: Arc<FakeDownloader>,
    converter: Arc<FakeConverter>,
    transport: Arc<FakeTransport>,
    observer: Arc<RecordingObserver>,
    dir: TempDir,
}

impl Harness {
    fn builder() -> HarnessBuilder {
        HarnessBuilder {
            port: "587".into(),
            workers: 1,
            platform: FakePlatform::default(),
            downloader: FakeDownloader::default(),
            converter: FakeConverter::default(),
            transport: FakeTransport::default(),
        }
    }

    fn assert_clean(&self) {
        let store = self.pipeline.store();
        assert_eq!(store.outstanding(), 0, "every acquired file is released");
        let left: Vec<_> = std::fs::read_dir(self.dir.path()).unwrap().collect();
        assert!(left.is_empty(), "temp dir not empty: {left:?}");
    }
}

struct HarnessBuilder {
    port: String,
    workers: usize,
    platform: FakePlatform,
    downloader: FakeDownloader,
    converter: FakeConverter,
    transport: FakeTransport,
}

impl HarnessBuilder {
    fn port(mut self, port: &str) -> Self {
        self.port = port.into();
        self
    }

    fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    fn platform(mut self, p: FakePlatform) -> Self {
        self.platform = p;
        self
    }

    fn downloader(mut self, d: FakeDownloader) -> Self {
        self.downloader = d;
        self
    }

    fn converter(mut self, c: FakeConverter) -> Self {
        self.converter = c;
        self
    }

    fn transport(mut self, t: FakeTransport) -> Self {
        self.transport = t;
        self
    }

    fn build(self) -> Harness {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("ebook_courier=debug")
            .with_test_writer()
            .try_init();

        let dir = TempDir::new().unwrap();
        let observer = Arc::new(RecordingObserver::default());
        let config = BridgeConfig::builder()
            .telegram_token("1:test")
            .mail(
                MailSettings::new("smtp.test", self.port, "me@test.com", "secret", "me@kindle.com")
                    .with_subject("Books"),
            )
            .workers(self.workers)
            .observer(observer.clone())
            .build()
            .unwrap();

        let platform = Arc::new(self.platform);
        let downloader = Arc::new(self.downloader);
        let converter = Arc::new(self.converter);
        let transport = Arc::new(self.transport);
        let pipeline = Pipeline::new(
            &config,
            TransientStore::new(dir.path()),
            Collaborators {
                platform: platform.clone(),
                downloader: downloader.clone(),
                converter: converter.clone(),
                transport: transport.clone(),
            },
        );

        Harness {
            pipeline,
            platform,
            downloader,
            converter,
            transport,
            observer,
            dir,
        }
    }
}

fn doc(name: &str) -> InboundDocument {
    InboundDocument {
        file_id: format!("file-{name}"),
        file_name: name.to_string(),
        chat_id: ChatId(42),
    }
}

// ── Successful deliveries ────────────────────────────────────────────────────

#[tokio::test]
async fn mobi_is_converted_and_mailed() {
    let h = Harness::builder().build();

    let outcome = h.pipeline.process(doc("book.mobi")).await;

    match &outcome {
        JobOutcome::Delivered {
            attachment_name,
            converted,
        } => {
            assert_eq!(attachment_name, "book.epub");
            assert!(*converted);
        }
        JobOutcome::Failed(f) => panic!("unexpected failure: {f}"),
    }

    let calls = h.converter.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let (input, output) = &calls[0];
    assert_eq!(input.extension().unwrap(), "mobi");
    assert_eq!(output.extension().unwrap(), "epub");
    assert_eq!(input.file_stem(), output.file_stem(), "output keeps the base name");
    assert_eq!(input.parent(), output.parent());
    assert_eq!(*h.downloader.dests.lock().unwrap(), vec![input.clone()]);

    let sent = h.transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (endpoint, mail, body) = &sent[0];
    assert_eq!(endpoint.port, 587);
    assert_eq!(mail.attachment_name, "book.epub");
    assert_eq!(&mail.attachment_path, output, "converted file is attached");
    assert_eq!(mail.subject.as_deref(), Some("Books"));
    assert_eq!(mail.to.email.to_string(), "me@kindle.com");
    assert_eq!(body.as_slice(), CONVERTED_BYTES);
    drop(sent);

    assert_eq!(h.platform.texts(), vec![SENDING_MESSAGE, SUCCESS_MESSAGE]);
    assert_eq!(
        *h.observer.stages.lock().unwrap(),
        vec![Stage::Fetching, Stage::Converting, Stage::Sending]
    );
    h.assert_clean();
}

#[tokio::test]
async fn epub_skips_conversion() {
    let h = Harness::builder().build();

    let outcome = h.pipeline.process(doc("notes.epub")).await;

    assert!(outcome.is_delivered());
    assert!(h.converter.calls.lock().unwrap().is_empty());
    let fetched = h.downloader.dests.lock().unwrap().clone();
    assert_eq!(fetched.len(), 1);
    let sent = h.transport.sent.lock().unwrap();
    assert_eq!(sent[0].1.attachment_name, "notes.epub");
    assert_eq!(sent[0].1.attachment_path, fetched[0], "fetched file is attached as is");
    assert_eq!(sent[0].2.as_slice(), BOOK_BYTES);
    drop(sent);

    assert_eq!(
        *h.observer.stages.lock().unwrap(),
        vec![Stage::Fetching, Stage::Sending]
    );
    h.assert_clean();
}

#[tokio::test]
async fn target_extension_match_ignores_case() {
    let h = Harness::builder().build();

    let outcome = h.pipeline.process(doc("NOTES.EPUB")).await;

    assert!(matches!(
        outcome,
        JobOutcome::Delivered { converted: false, .. }
    ));
    assert!(h.converter.calls.lock().unwrap().is_empty());
    h.assert_clean();
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_numeric_port_fails_before_dialling() {
    let h = Harness::builder().port("abc").build();

    let outcome = h.pipeline.process(doc("notes.epub")).await;

    let failure = outcome.failure().expect("job must fail");
    assert_eq!(failure.stage, Stage::Sending);
    assert_eq!(failure.error.kind(), ErrorKind::Config);
    assert_eq!(h.transport.count(), 0);

    let texts = h.platform.texts();
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0], SENDING_MESSAGE);
    assert!(
        texts[1].starts_with("Mail settings are invalid: SMTP_PORT 'abc'"),
        "got: {}",
        texts[1]
    );
    h.assert_clean();
}

#[tokio::test]
async fn unresolvable_file_reports_once_and_stops() {
    let h = Harness::builder()
        .platform(FakePlatform {
            fail_resolve: true,
            ..Default::default()
        })
        .build();

    let outcome = h.pipeline.process(doc("book.mobi")).await;

    assert_eq!(outcome.failure().unwrap().stage, Stage::Fetching);
    let texts = h.platform.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("Failed to download the file from telegram: "));
    assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 0);
    assert!(h.converter.calls.lock().unwrap().is_empty());
    assert_eq!(h.transport.count(), 0);
    assert_eq!(*h.observer.stages.lock().unwrap(), vec![Stage::Fetching]);
    h.assert_clean();
}

#[tokio::test]
async fn failed_download_releases_its_file() {
    let h = Harness::builder()
        .downloader(FakeDownloader {
            fail: true,
            ..Default::default()
        })
        .build();

    let outcome = h.pipeline.process(doc("book.mobi")).await;

    assert_eq!(outcome.failure().unwrap().stage, Stage::Fetching);
    assert_eq!(h.pipeline.store().acquired(), 1);
    assert_eq!(
        h.platform.texts(),
        vec!["Failed to download the file from telegram: HTTP status server error (502 Bad Gateway)"]
    );
    h.assert_clean();
}

#[tokio::test]
async fn conversion_failure_passes_diagnostic_through() {
    let h = Harness::builder()
        .converter(FakeConverter {
            fail: true,
            ..Default::default()
        })
        .build();

    let outcome = h.pipeline.process(doc("book.azw3")).await;

    assert_eq!(outcome.failure().unwrap().stage, Stage::Converting);
    assert_eq!(
        h.platform.texts(),
        vec!["Failed to convert the book to epub: exit status: 1\nUnknown input format"]
    );
    assert_eq!(h.transport.count(), 0);
    assert_eq!(
        *h.observer.stages.lock().unwrap(),
        vec![Stage::Fetching, Stage::Converting]
    );
    h.assert_clean();
}

#[tokio::test]
async fn transport_failure_after_conversion_cleans_both_files() {
    let h = Harness::builder()
        .transport(FakeTransport {
            fail: true,
            ..Default::default()
        })
        .build();

    let outcome = h.pipeline.process(doc("book.mobi")).await;

    assert_eq!(outcome.failure().unwrap().stage, Stage::Sending);
    assert_eq!(h.transport.count(), 1);
    assert_eq!(
        h.platform.texts(),
        vec![
            SENDING_MESSAGE.to_string(),
            "Failed to send the letter: Connection refused (os error 111)".to_string(),
        ]
    );
    assert_eq!(h.pipeline.store().acquired(), 2);
    h.assert_clean();
}

#[tokio::test]
async fn blocked_chat_does_not_abort_delivery() {
    let h = Harness::builder()
        .platform(FakePlatform {
            fail_send: true,
            ..Default::default()
        })
        .build();

    let outcome = h.pipeline.process(doc("book.mobi")).await;

    assert!(outcome.is_delivered());
    assert_eq!(h.transport.count(), 1);
    assert_eq!(h.platform.texts().len(), 2);
    h.assert_clean();
}

// ── Worker pool ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn run_drains_the_stream_with_several_workers() {
    let h = Harness::builder().workers(2).build();
    let docs = vec![doc("a.mobi"), doc("b.epub"), doc("c.fb2")];

    h.pipeline.run(stream::iter(docs)).await;

    assert_eq!(h.transport.count(), 3);
    assert_eq!(h.observer.completed.load(Ordering::SeqCst), 3);
    assert_eq!(h.converter.calls.lock().unwrap().len(), 2);

    let mut names: Vec<String> = h
        .transport
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|(_, m, _)| m.attachment_name.clone())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.epub", "b.epub", "c.epub"]);
    h.assert_clean();
}

#[tokio::test]
async fn run_continues_after_a_failed_job() {
    let h = Harness::builder().port("99999").build();

    h.pipeline
        .run(stream::iter(vec![doc("a.epub"), doc("b.epub")]))
        .await;

    assert_eq!(h.observer.completed.load(Ordering::SeqCst), 2);
    let failures = h
        .platform
        .texts()
        .into_iter()
        .filter(|t| t.starts_with("Mail settings are invalid"))
        .count();
    assert_eq!(failures, 2);
    h.assert_clean();
}

#[tokio::test]
async fn interrupted_run_leaves_no_files() {
    let h = Harness::builder()
        .converter(FakeConverter {
            hang: true,
            ..Default::default()
        })
        .build();

    let run = h.pipeline.run(stream::iter(vec![doc("a.mobi")]));
    let res = tokio::time::timeout(Duration::from_millis(200), run).await;

    assert!(res.is_err(), "run must still be waiting on the converter");
    assert_eq!(h.converter.calls.lock().unwrap().len(), 1);
    assert_eq!(h.pipeline.store().acquired(), 2);
    assert_eq!(h.transport.count(), 0);
    h.assert_clean();
}
