#![allow(rustdoc::redundant_explicit_links)]
//! Copy a file or directory out of a remote repository without cloning it.
//!
//! A compact locator such as `github:owner/repo/docs@v1.2.0` names a path inside a repository at
//! some reference. This crate downloads the repository archive for that reference once, then
//! extracts only the entries under the requested path into a local directory. No per-file API
//! calls are made, so the download is not subject to API rate limits.
//!
//! # Core Features
//!
//! - Parse locators in either of the equivalent forms `github:owner/repo/path@ref` and
//!   `github:owner/repo@ref/path`. An omitted reference means `main`.
//! - Stream the archive to a scoped temporary file which is always removed afterwards.
//! - Extract the selected subset, refusing any archive entry which would land outside the target
//!   directory.
//!
//! # Optional Features
//!
//! - `rayon` (default): write the selected files in parallel once the archive has been planned.
//!
//! # Usage
//!
//! Parse a locator:
//!
//! ```rust
//! use fetch_subtree::{Locator, PathKind};
//!
//! let locator: Locator = "github:rust-lang/rust/src/README.md@master".parse()?;
//! assert_eq!(locator.owner(), "rust-lang");
//! assert_eq!(locator.reference(), "master");
//! assert_eq!(locator.kind(), PathKind::File);
//! # Ok::<(), fetch_subtree::LocatorError>(())
//! ```
//!
//! Download a directory:
//!
//! ```rust,no_run
//! use fetch_subtree::{CancelToken, DownloadRequest, Downloader, DownloaderConfig, Locator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let locator: Locator = "github:dtolnay/syn@master/src".parse()?;
//! let downloader = Downloader::new(DownloaderConfig::default())?;
//! let request = DownloadRequest::new(&locator, "vendor/syn-src");
//! let outcome = downloader.download(&request, &CancelToken::new())?;
//! println!("copied {} file(s) into {}", outcome.files, outcome.target.display());
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod download;
mod error;
pub mod extract;
mod helper;
pub mod locator;

#[doc(inline)]
pub use crate::acquire::{AcquireConfig, ArchiveAcquirer, ArchiveHandle};
#[doc(inline)]
pub use crate::download::{DownloadOutcome, DownloadRequest, Downloader, DownloaderConfig};
#[doc(inline)]
pub use crate::error::{
    AcquireError, CleanupFailure, DownloadError, DownloadErrorInner, ErrorKind, ExtractError,
};
#[doc(inline)]
pub use crate::extract::{Extracted, ExtractOptions, Extractor, OverwritePolicy, SelectionPrefix};
#[doc(inline)]
pub use crate::helper::CancelToken;
#[doc(inline)]
pub use crate::locator::{DEFAULT_REFERENCE, Locator, LocatorError, PathKind, SCHEME};
