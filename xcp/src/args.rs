use std::path::PathBuf;
use std::time::Duration;

use clap::FromArgMatches;
use clap::{CommandFactory, Parser};

use fetch_subtree::acquire::DEFAULT_BASE_URL;
use fetch_subtree::{
    AcquireConfig, DownloaderConfig, ExtractOptions, Locator, OverwritePolicy, PathKind,
};

use crate::error::AppError;

// Shamelessly borrowed from https://github.com/crate-ci/clap-cargo/blob/0378657ffdf2b67bcd6f1ab56e04a1322b92dd0e/src/style.rs
// thanks to https://stackoverflow.com/a/79614957
use anstyle::AnsiColor::*;
use anstyle::Effects;
use anstyle::Style;

const HEADER: Style = Green.on_default().effects(Effects::BOLD);
const USAGE: Style = Green.on_default().effects(Effects::BOLD);
const LITERAL: Style = Cyan.on_default().effects(Effects::BOLD);
const PLACEHOLDER: Style = Cyan.on_default();
const ERROR: Style = Red.on_default().effects(Effects::BOLD);
const VALID: Style = Cyan.on_default().effects(Effects::BOLD);
const INVALID: Style = Yellow.on_default().effects(Effects::BOLD);

const APP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(HEADER)
    .usage(USAGE)
    .literal(LITERAL)
    .placeholder(PLACEHOLDER)
    .error(ERROR)
    .valid(VALID)
    .invalid(INVALID);

const AFTER_HELP: &str = "\
Examples:
  xcp github:rust-lang/rust/src/tools
  xcp github:rust-lang/rust@1.80.0/src/tools ./tools
  xcp github:dtolnay/syn/README.md > README.md";

#[derive(Debug, Parser)]
#[command(name = "xcp", version)]
#[command(about = "Copy a file or directory out of a GitHub repository without cloning it")]
#[command(long_about = None)]
#[command(after_help = AFTER_HELP)]
#[command(styles = APP_STYLING)]
#[command(term_width = 80)]
struct Args {
    /// What to copy: github:owner/repo[@ref][/path] or github:owner/repo/path[@ref]. The reference
    /// defaults to `main`.
    #[arg(value_name = "SOURCE")]
    source: String,

    /// Directory to copy into. If omitted, a path that looks like a file is written to stdout and
    /// anything else is copied into the current directory.
    #[arg(value_name = "TARGET")]
    target: Option<PathBuf>,

    /// Overwrite existing files
    #[arg(long, short = 'f')]
    overwrite: bool,

    /// Directory for the temporary archive download. Defaults to the system temporary directory.
    #[arg(long, value_name = "PATH", env = "XCP_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Host serving repository archives
    #[arg(long, value_name = "URL", env = "XCP_BASE_URL", default_value = DEFAULT_BASE_URL, hide = true)]
    base_url: String,

    /// Timeout for the archive download, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    timeout: u64,

    /// Show debug logging. Otherwise logging is controlled by `RUST_LOG`.
    #[arg(long, short = 'v')]
    verbose: bool,
}

/// Where the selected files end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Directory(PathBuf),
    /// Write the single selected file to stdout.
    Stdout,
}

#[derive(Debug)]
pub struct ValidatedArgs {
    pub locator: Locator,
    pub destination: Destination,
    pub config: DownloaderConfig,
    pub verbose: bool,
}

impl TryFrom<Args> for ValidatedArgs {
    type Error = AppError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let locator = Locator::parse(&args.source).map_err(AppError::locator)?;

        if args.timeout == 0 {
            return Err(AppError::arg_validation(
                "--timeout must be at least 1 second".to_string(),
            ));
        }

        if let Some(ref dir) = args.target
            && dir.exists()
            && !dir.is_dir()
        {
            return Err(AppError::arg_validation(format!(
                "target is not a directory: {}",
                dir.display()
            )));
        }

        let destination = match args.target {
            Some(dir) => Destination::Directory(dir),
            None if locator.kind() == PathKind::File => Destination::Stdout,
            None => Destination::Directory(PathBuf::from(".")),
        };

        let mut acquire = AcquireConfig {
            base_url: args.base_url,
            timeout: Duration::from_secs(args.timeout),
            ..Default::default()
        };
        if let Some(dir) = args.temp_dir {
            acquire.scratch_dir = dir;
        }
        let overwrite = if args.overwrite {
            OverwritePolicy::Overwrite
        } else {
            OverwritePolicy::Refuse
        };

        Ok(ValidatedArgs {
            locator,
            destination,
            config: DownloaderConfig {
                acquire,
                extract: ExtractOptions { overwrite },
            },
            verbose: args.verbose,
        })
    }
}

pub fn parse() -> Result<ValidatedArgs, AppError> {
    let matches = Args::command().get_matches();
    let args = match Args::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => {
            err.format(&mut Args::command()).exit();
        }
    };
    ValidatedArgs::try_from(args)
}
