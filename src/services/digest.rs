use crate::services::error::MediaError;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, ReadBuf};

/// Write tap used during ingestion: every byte feeds the SHA-256
/// accumulator, while only the first `limit` bytes are kept in a local
/// staging file for tools that need random-access file semantics.
///
/// `digest()` reflects every byte ever written, regardless of the
/// head-buffer limit; it is stable once the source stream is drained.
pub struct DigestTap {
    hasher: Sha256,
    temp_dir: PathBuf,
    limit: usize,
    head_written: usize,
    staging: Option<NamedTempFile>,
}

impl DigestTap {
    pub fn new(temp_dir: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            hasher: Sha256::new(),
            temp_dir: temp_dir.into(),
            limit,
            head_written: 0,
            staging: None,
        }
    }

    /// Allocates the staging file and returns its path.
    pub fn open(&mut self) -> Result<PathBuf, MediaError> {
        let file = tempfile::Builder::new()
            .prefix("ingest-")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| MediaError::Storage(format!("cannot create staging file: {e}")))?;
        let path = file.path().to_path_buf();
        self.staging = Some(file);
        Ok(path)
    }

    pub fn head_path(&self) -> Option<&Path> {
        self.staging.as_ref().map(|f| f.path())
    }

    pub fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.hasher.update(buf);

        if self.head_written >= self.limit {
            return Ok(());
        }
        let take = buf.len().min(self.limit - self.head_written);
        if let Some(file) = self.staging.as_mut() {
            file.write_all(&buf[..take])?;
        }
        self.head_written += take;
        Ok(())
    }

    pub fn close(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.staging.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    /// Deletes the staging file.
    pub fn clear(&mut self) {
        self.staging = None;
    }

    /// Hex-encoded hash over all bytes written so far.
    pub fn digest(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }
}

/// Reader adapter that tees everything read from `inner` into a [`DigestTap`].
/// Composing it under the primary write path hashes and samples the stream
/// while the full object is persisted exactly once.
pub struct TapReader<R> {
    inner: R,
    tap: Arc<Mutex<DigestTap>>,
}

impl<R> TapReader<R> {
    pub fn new(inner: R, tap: Arc<Mutex<DigestTap>>) -> Self {
        Self { inner, tap }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TapReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let filled = buf.filled();
                if filled.len() > before {
                    let mut tap = this.tap.lock().expect("digest tap poisoned");
                    tap.write(&filled[before..])?;
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
