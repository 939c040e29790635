//! Downloading repository archives to scoped temporary files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;

use crate::error::AcquireError;
use crate::helper::{CancelToken, CopyError, copy_cancellable};
use crate::locator::Locator;

/// The host archives are fetched from unless configured otherwise.
pub const DEFAULT_BASE_URL: &str = "https://github.com";

/// Archives can be large, so the whole transfer gets several minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Establishing the connection should never take this long.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Declared archive sizes above this produce a warning (1 GiB).
pub const LARGE_ARCHIVE_THRESHOLD: u64 = 1 << 30;

const TEMP_FILE_PREFIX: &str = "xcp-download-";
const TEMP_FILE_SUFFIX: &str = ".zip";

// How often a pending request checks for cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Settings for an [`ArchiveAcquirer`].
#[derive(Debug, Clone)]
pub struct AcquireConfig {
    /// Scheme and host (optionally with a path) under which `{owner}/{repo}/archive/{ref}.zip` lives.
    pub base_url: String,
    /// Timeout for the whole request, including reading the body.
    pub timeout: Duration,
    /// Timeout for the connect phase alone.
    pub connect_timeout: Duration,
    /// Directory in which downloaded archives are stored until extracted.
    pub scratch_dir: PathBuf,
    /// Declared sizes above this many bytes are reported as a warning. The download continues.
    pub large_archive_threshold: u64,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            scratch_dir: std::env::temp_dir(),
            large_archive_threshold: LARGE_ARCHIVE_THRESHOLD,
        }
    }
}

/// A downloaded archive in the scratch directory.
///
/// The file is removed when the handle is [closed](ArchiveHandle::close) or dropped. Closing
/// reports whether the removal succeeded; dropping ignores failures.
#[derive(Debug)]
pub struct ArchiveHandle {
    path: tempfile::TempPath,
    size: u64,
}

impl ArchiveHandle {
    /// The location of the archive on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The number of bytes written.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Remove the archive.
    pub fn close(self) -> std::io::Result<()> {
        self.path.close()
    }
}

impl AsRef<Path> for ArchiveHandle {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

/// Fetches repository archives over HTTP(S).
///
/// The client and base URL are supplied at construction so tests can point the acquirer at a
/// local server.
#[derive(Debug, Clone)]
pub struct ArchiveAcquirer {
    client: reqwest::blocking::Client,
    base_url: url::Url,
    scratch_dir: PathBuf,
    large_archive_threshold: u64,
}

impl ArchiveAcquirer {
    /// Build an acquirer with its own HTTP client.
    pub fn new(config: AcquireConfig) -> Result<Self, AcquireError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout.min(config.timeout))
            .user_agent(concat!("fetch-subtree/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AcquireError::Client)?;
        Self::with_client(client, config)
    }

    /// Build an acquirer which sends requests through `client`. The timeouts in `config` are not
    /// applied to a supplied client.
    pub fn with_client(
        client: reqwest::blocking::Client,
        config: AcquireConfig,
    ) -> Result<Self, AcquireError> {
        let base_url = url::Url::parse(&config.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| AcquireError::InvalidBaseUrl {
                url: config.base_url.clone(),
            })?;
        Ok(Self {
            client,
            base_url,
            scratch_dir: config.scratch_dir,
            large_archive_threshold: config.large_archive_threshold,
        })
    }

    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    /// The archive URL for `locator` under this acquirer's base URL.
    pub fn archive_url(&self, locator: &Locator) -> Result<url::Url, AcquireError> {
        locator
            .archive_url(&self.base_url)
            .ok_or_else(|| AcquireError::InvalidBaseUrl {
                url: self.base_url.to_string(),
            })
    }

    /// Download `url` into a new temporary file in the scratch directory.
    ///
    /// The body is streamed to disk. If the transfer fails or is cancelled, the partial file is
    /// removed before the error is returned. Cancelling while the request is still waiting for a
    /// response returns immediately; a failure after cancellation is reported as cancellation.
    pub fn acquire(
        &self,
        url: &url::Url,
        cancel: &CancelToken,
    ) -> Result<ArchiveHandle, AcquireError> {
        if cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }

        tracing::info!(%url, "downloading archive");
        let mut response = self.send(url, cancel)?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(AcquireError::NotFound {
                    url: url.to_string(),
                });
            }
            status => {
                return Err(AcquireError::UnexpectedResponse {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
        }

        if let Some(length) = response.content_length()
            && length > self.large_archive_threshold
        {
            tracing::warn!(
                "downloading large repository archive ({:.1} MB)",
                length as f64 / (1u64 << 20) as f64
            );
        }

        std::fs::create_dir_all(&self.scratch_dir).map_err(|err| AcquireError::Write {
            path: self.scratch_dir.clone(),
            err,
        })?;
        let (mut file, path) = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(TEMP_FILE_SUFFIX)
            .tempfile_in(&self.scratch_dir)
            .map_err(|err| AcquireError::Write {
                path: self.scratch_dir.clone(),
                err,
            })?
            .into_parts();

        let copied = copy_cancellable(&mut response, &mut file, cancel);
        drop(file);
        match copied {
            Ok(size) => {
                tracing::debug!(path = %path.display(), size, "archive downloaded");
                Ok(ArchiveHandle { path, size })
            }
            Err(err) => {
                let partial = path.to_path_buf();
                if let Err(cleanup) = path.close() {
                    tracing::warn!(
                        "failed to remove partial archive {}: {cleanup}",
                        partial.display()
                    );
                }
                Err(match err {
                    _ if cancel.is_cancelled() => AcquireError::Cancelled,
                    CopyError::Cancelled => AcquireError::Cancelled,
                    CopyError::Read(err) => AcquireError::Transfer {
                        url: url.to_string(),
                        err,
                    },
                    CopyError::Write(err) => AcquireError::Write { path: partial, err },
                })
            }
        }
    }

    // The request runs on its own thread so that a cancelled caller doesn't wait for the server.
    // An abandoned request finishes in the background once its timeout expires.
    fn send(
        &self,
        url: &url::Url,
        cancel: &CancelToken,
    ) -> Result<reqwest::blocking::Response, AcquireError> {
        let request = self.client.get(url.clone());
        let pending = std::thread::spawn(move || request.send());
        while !pending.is_finished() {
            if cancel.is_cancelled() {
                tracing::debug!(%url, "abandoning request");
                return Err(AcquireError::Cancelled);
            }
            std::thread::sleep(CANCEL_POLL_INTERVAL);
        }
        let sent = pending
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        sent.map_err(|err| {
            if cancel.is_cancelled() {
                AcquireError::Cancelled
            } else {
                AcquireError::Network {
                    url: url.to_string(),
                    err,
                }
            }
        })
    }
}
