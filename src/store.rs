//! Transient Store: one scoped scratch file per pipeline stage.
//!
//! Every file handed out by [`TransientStore`] is a [`TransientFile`] guard.
//! The guard is released explicitly with [`TransientFile::release`] on the
//! normal exit paths and, as a fallback, from `Drop` (early return, panic,
//! cancelled task). Release consumes the guard, so a file can be removed at
//! most once; deletion failures are logged and never propagated.
//!
//! Files are created with [`tempfile`] so concurrent jobs get unique names in
//! the shared scratch directory without any locking.

use crate::error::BridgeError;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

const FILE_PREFIX: &str = "courier-";

#[derive(Debug, Default)]
struct Ledger {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Hands out per-job scratch files in a single directory.
///
/// Cloning is cheap; clones share the same directory and counters.
#[derive(Debug, Clone)]
pub struct TransientStore {
    dir: PathBuf,
    ledger: Arc<Ledger>,
}

impl TransientStore {
    /// A store rooted at `dir`. The directory must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ledger: Arc::default(),
        }
    }

    /// A store rooted at the system temp directory.
    pub fn in_system_temp() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Create a new, empty file whose name ends with `suffix` (e.g. `".mobi"`).
    pub fn acquire(&self, suffix: &str) -> Result<TransientFile, BridgeError> {
        let named = tempfile::Builder::new()
            .prefix(FILE_PREFIX)
            .suffix(suffix)
            .tempfile_in(&self.dir)
            .map_err(|e| BridgeError::local_io("Failed to create temp file in", &self.dir, e))?;

        // Ownership of deletion moves to the guard below.
        let (file, path) = named.keep().map_err(|e| {
            BridgeError::local_io("Failed to take ownership of temp file", e.file.path(), e.error)
        })?;

        debug!("Acquired transient file {}", path.display());
        Ok(self.register(path, Some(file)))
    }

    /// Reserve `source`'s path with its extension swapped to `extension`.
    ///
    /// Nothing is created on disk; the guard only owns removal of whatever
    /// an external tool later writes there.
    pub fn reserve_sibling(&self, source: &TransientFile, extension: &str) -> TransientFile {
        let path = source.path.with_extension(extension.trim_start_matches('.'));
        debug!("Reserved transient path {}", path.display());
        self.register(path, None)
    }

    /// Files acquired or reserved so far.
    pub fn acquired(&self) -> usize {
        self.ledger.acquired.load(Ordering::SeqCst)
    }

    /// Files released so far.
    pub fn released(&self) -> usize {
        self.ledger.released.load(Ordering::SeqCst)
    }

    /// Guards currently alive.
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }

    fn register(&self, path: PathBuf, handle: Option<File>) -> TransientFile {
        self.ledger.acquired.fetch_add(1, Ordering::SeqCst);
        TransientFile {
            path,
            handle,
            ledger: Arc::clone(&self.ledger),
            released: false,
        }
    }
}

/// Exclusive guard over one scratch file.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
    handle: Option<File>,
    ledger: Arc<Ledger>,
    released: bool,
}

impl TransientFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close and delete the file.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // Close before unlinking.
        drop(self.handle.take());

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Deleted transient file {}", self.path.display()),
            // A reserved path the converter never wrote.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Transient file {} was never created", self.path.display())
            }
            Err(e) => error!(
                "Failed to delete the file: {}. Error: {}",
                self.path.display(),
                e
            ),
        }
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        self.release_once();
    }
}
