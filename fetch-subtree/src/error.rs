use std::path::PathBuf;

use crate::locator::LocatorError;

/// Categories of errors that can be matched on, whichever stage produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The locator string has no recognised scheme or too few components.
    MalformedLocator,
    /// The locator has an empty owner.
    MissingOwner,
    /// The locator has no repository.
    MissingRepo,
    /// The archive request returned 404. Either the repository or the reference does not exist.
    ReferenceOrRepositoryNotFound,
    /// The archive request returned some other non-200 status.
    UnexpectedResponse,
    /// The archive could not be transferred or stored.
    NetworkFailure,
    /// No archive entry lies at or under the requested path.
    PathNotFoundInArchive,
    /// An archive entry would be written outside the target directory.
    PathTraversalAttempt,
    /// Reading the archive or writing to the target directory failed.
    ExtractIoFailure,
    /// The operation was cancelled.
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::MalformedLocator => "malformed locator",
            Self::MissingOwner => "missing owner",
            Self::MissingRepo => "missing repository",
            Self::ReferenceOrRepositoryNotFound => "reference or repository not found",
            Self::UnexpectedResponse => "unexpected response",
            Self::NetworkFailure => "network failure",
            Self::PathNotFoundInArchive => "path not found in archive",
            Self::PathTraversalAttempt => "path traversal attempt",
            Self::ExtractIoFailure => "extraction I/O failure",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Errors encountered while downloading a repository archive.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// The host returned 404 for the archive URL.
    #[error("repository or reference not found (404): {url}")]
    NotFound { url: String },

    /// The host returned a status other than 200 or 404.
    #[error("unexpected status code {status} from {url}")]
    UnexpectedResponse { url: String, status: u16 },

    /// The request could not be completed.
    #[error("network error while fetching {url}")]
    Network {
        url: String,
        #[source]
        err: reqwest::Error,
    },

    /// The connection failed while the archive body was being streamed.
    #[error("transfer of {url} was interrupted")]
    Transfer {
        url: String,
        #[source]
        err: std::io::Error,
    },

    /// The archive could not be written to the scratch directory.
    #[error("failed to write archive to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// The configured base URL cannot have path segments appended to it.
    #[error("invalid archive base URL: {url}")]
    InvalidBaseUrl { url: String },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("download cancelled")]
    Cancelled,
}

impl AcquireError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::ReferenceOrRepositoryNotFound,
            Self::UnexpectedResponse { .. } => ErrorKind::UnexpectedResponse,
            Self::Network { .. }
            | Self::Transfer { .. }
            | Self::Write { .. }
            | Self::InvalidBaseUrl { .. }
            | Self::Client(_) => ErrorKind::NetworkFailure,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Errors encountered while extracting entries from a downloaded archive.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The archive could not be opened or one of its entries could not be read.
    #[error("failed to read zip archive {}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        err: zip::result::ZipError,
    },

    /// Nothing in the archive matched the selection prefix.
    #[error("path '{prefix}' not found in repository")]
    PathNotFound { prefix: String },

    /// An entry would be materialised outside the target directory.
    #[error("path traversal attempt: archive entry '{entry}' resolves outside {}", target.display())]
    PathTraversal { entry: String, target: PathBuf },

    /// A relative path was requested for an entry which does not match the selection prefix.
    #[error("archive entry '{entry}' is not under selection '{prefix}'")]
    InvalidSelection { entry: String, prefix: String },

    /// The destination exists and the overwrite policy forbids replacing it.
    #[error("file already exists: {}", path.display())]
    DestinationExists { path: PathBuf },

    /// A filesystem operation failed.
    #[error("failed to {action} {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            err,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathNotFound { .. } => ErrorKind::PathNotFoundInArchive,
            Self::PathTraversal { .. } => ErrorKind::PathTraversalAttempt,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Archive { .. }
            | Self::InvalidSelection { .. }
            | Self::DestinationExists { .. }
            | Self::Io { .. } => ErrorKind::ExtractIoFailure,
        }
    }
}

/// The temporary archive could not be removed after a download.
#[derive(Debug, thiserror::Error)]
#[error("failed to clean up archive {}: {err}", path.display())]
pub struct CleanupFailure {
    pub path: PathBuf,
    #[source]
    pub err: std::io::Error,
}

/// The stage of a download which failed.
#[derive(Debug, thiserror::Error)]
pub enum DownloadErrorInner {
    #[error("invalid download request")]
    Locator(#[source] LocatorError),
    #[error("failed to download repository archive")]
    Acquire(#[source] AcquireError),
    #[error("failed to extract path from archive")]
    Extract(#[source] ExtractError),
}

/// The error returned by [`Downloader::download`](crate::Downloader::download).
///
/// The underlying [`AcquireError`] or [`ExtractError`] is kept as the error source. If removing
/// the temporary archive also failed, that failure is reported alongside rather than replacing
/// the original error.
#[derive(Debug)]
pub struct DownloadError {
    inner: Box<DownloadErrorInner>,
    kind: ErrorKind,
    cleanup: Option<CleanupFailure>,
}

impl DownloadError {
    pub(crate) fn new(inner: DownloadErrorInner) -> Self {
        let kind = match &inner {
            DownloadErrorInner::Locator(err) => err.kind(),
            DownloadErrorInner::Acquire(err) => err.kind(),
            DownloadErrorInner::Extract(err) => err.kind(),
        };
        Self {
            inner: Box::new(inner),
            kind,
            cleanup: None,
        }
    }

    pub(crate) fn with_cleanup_failure(mut self, cleanup: CleanupFailure) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    /// Get the error kind for pattern matching
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The stage which failed, with its underlying error.
    pub fn inner(&self) -> &DownloadErrorInner {
        &self.inner
    }

    /// The failure to remove the temporary archive, if that also went wrong.
    pub fn cleanup_failure(&self) -> Option<&CleanupFailure> {
        self.cleanup.as_ref()
    }
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)?;
        if let Some(cleanup) = &self.cleanup {
            write!(f, " (warning: {cleanup})")?;
        }
        Ok(())
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<LocatorError> for DownloadError {
    fn from(err: LocatorError) -> Self {
        Self::new(DownloadErrorInner::Locator(err))
    }
}

impl From<AcquireError> for DownloadError {
    fn from(err: AcquireError) -> Self {
        Self::new(DownloadErrorInner::Acquire(err))
    }
}

impl From<ExtractError> for DownloadError {
    fn from(err: ExtractError) -> Self {
        Self::new(DownloadErrorInner::Extract(err))
    }
}

#[cfg(test)]
mod test_download_error {
    use super::*;
    use std::error::Error;

    #[test]
    fn kind_follows_the_failed_stage() {
        let err = DownloadError::from(ExtractError::PathNotFound {
            prefix: "repo-main/nope".to_string(),
        });
        assert_eq!(err.kind(), &ErrorKind::PathNotFoundInArchive);
        assert!(matches!(err.inner(), DownloadErrorInner::Extract(_)));

        let err = DownloadError::from(AcquireError::NotFound {
            url: "https://example.com/o/r/archive/main.zip".to_string(),
        });
        assert_eq!(err.kind(), &ErrorKind::ReferenceOrRepositoryNotFound);
    }

    #[test]
    fn cleanup_failure_is_reported_alongside() {
        let err = DownloadError::from(ExtractError::Cancelled).with_cleanup_failure(CleanupFailure {
            path: PathBuf::from("/tmp/xcp-download-1.zip"),
            err: std::io::Error::other("busy"),
        });
        assert_eq!(err.kind(), &ErrorKind::Cancelled);
        let message = err.to_string();
        assert!(message.starts_with("failed to extract path from archive"));
        assert!(message.contains("warning: failed to clean up archive /tmp/xcp-download-1.zip: busy"));
        assert!(matches!(
            err.source().and_then(|e| e.downcast_ref::<ExtractError>()),
            Some(ExtractError::Cancelled)
        ));
        assert!(err.cleanup_failure().is_some());
    }
}
