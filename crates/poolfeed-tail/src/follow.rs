//! Following a single growing file.
//!
//! `FollowedFile` keeps a byte offset into its path and, on every poll, reads
//! whatever was appended since. Only complete lines are returned; a trailing
//! fragment waits for its newline. The path is re-checked on each poll, so a
//! rotated, truncated or recreated file is picked up from offset 0. A file
//! rewritten in place between two polls is caught by comparing its first
//! bytes with the ones seen before.

use poolfeed_core::config::LogFileConfig;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use crate::error::{Result, TailError};

/// Upper bound on bytes read in one poll; the rest is read on the next one.
const MAX_READ_PER_POLL: u64 = 1024 * 1024;

/// How many leading bytes are remembered to recognise the same content.
const HEAD_FINGERPRINT_LEN: u64 = 64;

/// What identifies "the same file" across polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(meta: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(_meta: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

/// Read position in one followed file.
#[derive(Debug)]
pub struct FollowedFile {
    path: PathBuf,
    default_category: String,
    /// Next byte to read.
    offset: u64,
    /// `None` while the file is missing (or never seen).
    identity: Option<Option<FileIdentity>>,
    /// Bytes after the last newline seen so far.
    partial: Vec<u8>,
    /// First bytes of the file as last seen, up to `HEAD_FINGERPRINT_LEN`.
    head: Vec<u8>,
    /// Drop everything up to the first newline (backscan landed mid-line).
    skip_to_newline: bool,
}

impl FollowedFile {
    /// Start following `file`, positioned `backscan` bytes before its end.
    ///
    /// A missing file is not an error: it is read from the start once it
    /// appears.
    pub async fn open(file: LogFileConfig, backscan: u64) -> Self {
        let mut followed = Self {
            path: file.path,
            default_category: file.default_category,
            offset: 0,
            identity: None,
            partial: Vec::new(),
            head: Vec::new(),
            skip_to_newline: false,
        };

        match tokio::fs::metadata(&followed.path).await {
            Ok(meta) => {
                let start = meta.len().saturating_sub(backscan);
                if start > 0 {
                    // Start one byte early: if that byte is a newline the
                    // skipped "line" is empty and nothing real is lost.
                    followed.offset = start - 1;
                    followed.skip_to_newline = true;
                }
                followed.identity = Some(FileIdentity::of(&meta));
                if let Ok(mut file) = tokio::fs::File::open(&followed.path).await {
                    followed.head = read_prefix(&mut file, HEAD_FINGERPRINT_LEN)
                        .await
                        .unwrap_or_default();
                }
                debug!(path = %followed.path.display(), offset = followed.offset, "following log file");
            }
            Err(e) => {
                debug!(path = %followed.path.display(), error = %e, "log file not present yet");
            }
        }
        followed
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_category(&self) -> &str {
        &self.default_category
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// True while the path does not exist.
    pub fn is_missing(&self) -> bool {
        self.identity.is_none()
    }

    /// Whether the directory this file lives in still exists.
    pub async fn parent_exists(&self) -> bool {
        match self.path.parent() {
            Some(dir) => !matches!(tokio::fs::try_exists(dir).await, Ok(false)),
            None => true,
        }
    }

    /// Read newly appended complete lines.
    pub async fn poll(&mut self) -> Result<Vec<String>> {
        self.read_appended().await.map_err(|source| TailError::Io {
            path: self.path.clone(),
            source,
        })
    }

    async fn read_appended(&mut self) -> std::io::Result<Vec<String>> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.identity.is_some() {
                    info!(path = %self.path.display(), "log file disappeared, waiting for it to come back");
                    self.restart();
                    self.identity = None;
                }
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let identity = FileIdentity::of(&meta);
        match self.identity {
            None => {
                debug!(path = %self.path.display(), "log file appeared");
                self.restart();
            }
            Some(known) if known != identity => {
                info!(path = %self.path.display(), "log file rotated, reopening from start");
                self.restart();
            }
            Some(_) if meta.len() < self.offset => {
                info!(
                    path = %self.path.display(),
                    old_offset = self.offset,
                    new_len = meta.len(),
                    "log file truncated, reopening from start"
                );
                self.restart();
            }
            Some(_) => {}
        }
        self.identity = Some(identity);

        let mut file = tokio::fs::File::open(&self.path).await?;
        if self.offset > 0 && !self.head.is_empty() {
            let head = read_prefix(&mut file, self.head.len() as u64).await?;
            if head != self.head {
                info!(
                    path = %self.path.display(),
                    old_offset = self.offset,
                    "log file rewritten in place, reopening from start"
                );
                self.restart();
            }
        }
        let known_head = HEAD_FINGERPRINT_LEN.min(meta.len());
        if (self.head.len() as u64) < known_head {
            self.head = read_prefix(&mut file, known_head).await?;
        }

        if meta.len() <= self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let want = (meta.len() - self.offset).min(MAX_READ_PER_POLL);
        let mut buf = Vec::with_capacity(want as usize);
        let read = file.take(want).read_to_end(&mut buf).await?;
        self.offset += read as u64;

        Ok(self.split_lines(&buf))
    }

    fn restart(&mut self) {
        self.offset = 0;
        self.partial.clear();
        self.head.clear();
        self.skip_to_newline = false;
    }

    fn split_lines(&mut self, buf: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(buf);
        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.partial.drain(..=last_newline).collect();
        let mut lines = complete[..complete.len() - 1].split(|&b| b == b'\n');
        if self.skip_to_newline {
            lines.next();
            self.skip_to_newline = false;
        }
        lines
            .map(|raw| {
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                String::from_utf8_lossy(raw).into_owned()
            })
            .collect()
    }
}

/// Read up to `len` bytes from the start of `file`.
async fn read_prefix(file: &mut tokio::fs::File, len: u64) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(0)).await?;
    let mut buf = Vec::with_capacity(len as usize);
    (&mut *file).take(len).read_to_end(&mut buf).await?;
    Ok(buf)
}
