use std::process::ExitCode;

use fetch_subtree::{DownloadError, LocatorError};

/// Categories of application errors that can be matched on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorKind {
    /// Argument and locator validation errors
    ArgValidation,
    /// Downloading or extracting failed
    Download,
    /// Writing the selected file to stdout failed
    Output,
    /// General IO errors
    IO,
}

/// Internal error type that contains all application error variants.
#[derive(Debug, thiserror::Error)]
pub enum AppErrorInner {
    #[error("Argument error: {0}")]
    ArgValidation(String),
    #[error(transparent)]
    Locator(LocatorError),
    #[error("failed to copy {source_locator}")]
    Download {
        source_locator: String,
        #[source]
        err: DownloadError,
    },
    #[error("expected '{source_locator}' to be a single file, but it contains {files} file(s)")]
    NotSingleFile { source_locator: String, files: usize },
    #[error("failed to write to stdout")]
    Output(#[source] std::io::Error),
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

/// The main application-level error type. We keep the concrete error kind for the exit code while
/// still reporting the full chain of causes to the user.
///
/// This type uses the newtype pattern to wrap a boxed inner error, reducing stack size.
#[derive(Debug)]
pub struct AppError(Box<AppErrorInner>, AppErrorKind);

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl AppError {
    /// Create a new AppError with the given inner error and kind
    pub fn new(inner: AppErrorInner, kind: AppErrorKind) -> Self {
        Self(Box::new(inner), kind)
    }

    /// Get the error kind for pattern matching
    pub fn error_kind(&self) -> &AppErrorKind {
        &self.1
    }

    /// Create an argument validation error
    pub fn arg_validation(msg: String) -> Self {
        Self::new(AppErrorInner::ArgValidation(msg), AppErrorKind::ArgValidation)
    }

    /// An unparseable locator is reported like any other bad argument
    pub fn locator(err: LocatorError) -> Self {
        Self::new(AppErrorInner::Locator(err), AppErrorKind::ArgValidation)
    }

    pub fn download(source_locator: String, err: DownloadError) -> Self {
        Self::new(
            AppErrorInner::Download {
                source_locator,
                err,
            },
            AppErrorKind::Download,
        )
    }

    pub fn not_single_file(source_locator: String, files: usize) -> Self {
        Self::new(
            AppErrorInner::NotSingleFile {
                source_locator,
                files,
            },
            AppErrorKind::Download,
        )
    }

    pub fn output(err: std::io::Error) -> Self {
        Self::new(AppErrorInner::Output(err), AppErrorKind::Output)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::new(AppErrorInner::IO(err), AppErrorKind::IO)
    }
}

impl From<&AppErrorKind> for ExitCode {
    fn from(kind: &AppErrorKind) -> Self {
        ExitCode::from(match kind {
            AppErrorKind::Download => 1,
            AppErrorKind::ArgValidation => 2,
            AppErrorKind::Output | AppErrorKind::IO => 3,
        })
    }
}

impl From<AppError> for ExitCode {
    fn from(error: AppError) -> Self {
        error.error_kind().into()
    }
}
