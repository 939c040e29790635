use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fetch_subtree::{CancelToken, DownloadOutcome, DownloadRequest, Downloader};
use tracing_subscriber::EnvFilter;

use crate::args::{Destination, ValidatedArgs};
use crate::error::AppError;

mod args;
mod error;
mod progress;

// Conventional status for a process stopped by SIGINT
const INTERRUPTED: i32 = 130;

fn main() -> ExitCode {
    let result = args::parse().and_then(|args| {
        init_tracing(args.verbose);
        run(args)
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = ExitCode::from(err.error_kind());
            eprintln!("❌ {:#}", anyhow::Error::new(err));
            code
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("fetch_subtree=debug,xcp=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: ValidatedArgs) -> Result<(), AppError> {
    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    let handler = move || {
        if interrupt(&on_interrupt) {
            std::process::exit(INTERRUPTED);
        }
    };
    if let Err(err) = ctrlc::set_handler(handler) {
        tracing::warn!("interrupting will not clean up temporary files: {err}");
    }

    let downloader = Downloader::new(args.config)
        .map_err(|err| AppError::arg_validation(err.to_string()))?;

    match args.destination {
        Destination::Directory(target) => {
            let outcome = download(&downloader, &args.locator, target, &cancel, args.verbose)?;
            println!(
                "✅ Copied {} file(s) from {} into {}",
                outcome.files,
                args.locator,
                outcome.target.display()
            );
            Ok(())
        }
        Destination::Stdout => {
            let scratch = tempfile::Builder::new().prefix("xcp-").tempdir()?;
            let outcome = download(
                &downloader,
                &args.locator,
                scratch.path().to_path_buf(),
                &cancel,
                args.verbose,
            )?;
            let file = match (outcome.files, first_file(scratch.path())?) {
                (1, Some(file)) => file,
                (files, _) => return Err(AppError::not_single_file(args.locator.to_string(), files)),
            };
            let mut stdout = std::io::stdout().lock();
            let mut input = std::fs::File::open(&file)?;
            std::io::copy(&mut input, &mut stdout).map_err(AppError::output)?;
            stdout.flush().map_err(AppError::output)
        }
    }
}

/// The first interrupt asks the download to stop and clean up. Returns true for a repeated
/// interrupt, which should end the process without waiting.
fn interrupt(cancel: &CancelToken) -> bool {
    let repeated = cancel.is_cancelled();
    cancel.cancel();
    repeated
}

fn download(
    downloader: &Downloader,
    locator: &fetch_subtree::Locator,
    target: PathBuf,
    cancel: &CancelToken,
    quiet: bool,
) -> Result<DownloadOutcome, AppError> {
    let request = DownloadRequest::new(locator, target);
    let spinner = progress::start_spinner(locator, quiet);
    let result = downloader.download(&request, cancel);
    progress::finish_spinner(spinner, &result);
    let outcome = result.map_err(|err| AppError::download(locator.to_string(), err))?;
    for warning in &outcome.warnings {
        eprintln!("⚠️  {warning}");
    }
    Ok(outcome)
}

// The first regular file found under `dir`
fn first_file(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut pending = vec![dir.to_path_buf()];
    while let Some(next) = pending.pop() {
        for entry in std::fs::read_dir(next)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                pending.push(entry.path());
            } else {
                return Ok(Some(entry.path()));
            }
        }
    }
    Ok(None)
}
