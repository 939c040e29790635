//! Fetching a path from a repository in a single call: acquire the archive, extract the selected
//! subset, and remove the archive again whatever happened.

use std::path::PathBuf;

use crate::acquire::{AcquireConfig, ArchiveAcquirer, ArchiveHandle};
use crate::error::{AcquireError, CleanupFailure, DownloadError, ExtractError};
use crate::extract::{ExtractOptions, Extracted, Extractor, archive_root};
use crate::helper::CancelToken;
use crate::locator::{Locator, LocatorError};

#[derive(Debug, Clone, Default)]
pub struct DownloaderConfig {
    pub acquire: AcquireConfig,
    pub extract: ExtractOptions,
}

/// What to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub owner: String,
    pub repo: String,
    /// Path within the repository. Empty means the whole repository.
    pub path: String,
    /// Branch, tag or commit. `None` means [`DEFAULT_REFERENCE`](crate::DEFAULT_REFERENCE).
    pub reference: Option<String>,
    /// Directory the selected files are written into. Created if absent.
    pub target: PathBuf,
}

impl DownloadRequest {
    pub fn new<P: Into<PathBuf>>(locator: &Locator, target: P) -> Self {
        Self {
            owner: locator.owner().to_string(),
            repo: locator.repo().to_string(),
            path: locator.path().to_string(),
            reference: Some(locator.reference().to_string()),
            target: target.into(),
        }
    }

    /// The locator this request refers to.
    pub fn locator(&self) -> Result<Locator, LocatorError> {
        Locator::from_parts(
            &self.owner,
            &self.repo,
            &self.path,
            self.reference.as_deref(),
        )
    }
}

/// The result of a successful download.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// Number of files written.
    pub files: usize,
    pub target: PathBuf,
    pub archive_url: url::Url,
    /// Problems which did not stop the download, such as failing to remove the temporary archive.
    pub warnings: Vec<String>,
}

/// Downloads paths from repositories.
#[derive(Debug, Clone)]
pub struct Downloader {
    acquirer: ArchiveAcquirer,
    extractor: Extractor,
}

impl Downloader {
    pub fn new(config: DownloaderConfig) -> Result<Self, AcquireError> {
        Ok(Self::with_acquirer(
            ArchiveAcquirer::new(config.acquire)?,
            config.extract,
        ))
    }

    pub fn with_acquirer(acquirer: ArchiveAcquirer, options: ExtractOptions) -> Self {
        Self {
            acquirer,
            extractor: Extractor::new(options),
        }
    }

    /// Fetch `request.path` from the repository archive into `request.target`.
    ///
    /// The temporary archive is removed before this returns, on success and on every error.
    pub fn download(
        &self,
        request: &DownloadRequest,
        cancel: &CancelToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        let locator = request.locator()?;
        let archive_url = self.acquirer.archive_url(&locator)?;
        tracing::debug!(%locator, %archive_url, "starting download");

        let archive = self.acquirer.acquire(&archive_url, cancel)?;
        let extracted = self.extract(&archive, &locator, request, cancel);

        let archive_path = archive.path().to_path_buf();
        let cleanup = archive
            .close()
            .err()
            .map(|err| CleanupFailure {
                path: archive_path,
                err,
            });

        conclude(extracted, cleanup, request, archive_url)
    }

    fn extract(
        &self,
        archive: &ArchiveHandle,
        locator: &Locator,
        request: &DownloadRequest,
        cancel: &CancelToken,
    ) -> Result<Extracted, ExtractError> {
        let mut prefix = locator.selection_prefix();
        // Tags like `v1.2.0` are archived under `repo-1.2.0`, so trust the archive's own root
        if let Some(root) = archive_root(archive)?
            && root != prefix.root()
        {
            tracing::debug!("archive root is '{root}', not '{}'", prefix.root());
            prefix = prefix.with_root(&root);
        }
        self.extractor
            .extract(archive, &prefix, &request.target, cancel)
    }
}

/// Combine the extraction result with the outcome of removing the archive. A failed removal never
/// fails an otherwise successful download.
fn conclude(
    extracted: Result<Extracted, ExtractError>,
    cleanup: Option<CleanupFailure>,
    request: &DownloadRequest,
    archive_url: url::Url,
) -> Result<DownloadOutcome, DownloadError> {
    match (extracted, cleanup) {
        (Ok(extracted), cleanup) => {
            let warnings = cleanup
                .into_iter()
                .map(|failure| {
                    tracing::warn!("{failure}");
                    failure.to_string()
                })
                .collect();
            Ok(DownloadOutcome {
                files: extracted.files,
                target: request.target.clone(),
                archive_url,
                warnings,
            })
        }
        (Err(err), None) => Err(err.into()),
        (Err(err), Some(failure)) => Err(DownloadError::from(err).with_cleanup_failure(failure)),
    }
}

#[cfg(test)]
mod test_conclude {
    use super::*;
    use crate::error::ErrorKind;

    fn request() -> DownloadRequest {
        DownloadRequest::new(&Locator::parse("github:octo/repo").unwrap(), "out")
    }

    fn archive_url() -> url::Url {
        url::Url::parse("https://github.com/octo/repo/archive/main.zip").unwrap()
    }

    fn busy_archive() -> CleanupFailure {
        CleanupFailure {
            path: PathBuf::from("/tmp/xcp-download-abc.zip"),
            err: std::io::Error::other("file is busy"),
        }
    }

    #[test]
    fn cleanup_failure_after_success_is_a_warning() {
        let extracted = Ok(Extracted {
            files: 3,
            directories: 1,
        });
        let outcome = conclude(extracted, Some(busy_archive()), &request(), archive_url()).unwrap();
        assert_eq!(outcome.files, 3);
        assert_eq!(outcome.target, PathBuf::from("out"));
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("/tmp/xcp-download-abc.zip"));
        assert!(outcome.warnings[0].contains("file is busy"));
    }

    #[test]
    fn clean_success_has_no_warnings() {
        let outcome = conclude(Ok(Extracted::default()), None, &request(), archive_url()).unwrap();
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn cleanup_failure_after_error_keeps_the_error() {
        let err = conclude(
            Err(ExtractError::PathNotFound {
                prefix: "repo-main/nope".to_string(),
            }),
            Some(busy_archive()),
            &request(),
            archive_url(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::PathNotFoundInArchive);
        assert!(err.cleanup_failure().is_some());
    }
}
