use fetch_subtree::{DownloadError, DownloadOutcome, Locator};
use indicatif::{ProgressBar, ProgressStyle};

/// A spinner on stderr for the duration of a download. Indicatif draws nothing when stderr is not
/// a terminal; `quiet` hides it regardless, so it doesn't fight with log output.
pub fn start_spinner(locator: &Locator, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_strings(&[
            "▹▹▹▹▹",
            "▸▹▹▹▹",
            "▹▸▹▹▹",
            "▹▹▸▹▹",
            "▹▹▹▸▹",
            "▹▹▹▹▸",
            "▪▪▪▪▪",
        ]));
    }
    pb.set_message(format!("fetching {locator}"));
    pb
}

pub fn finish_spinner(pb: ProgressBar, result: &Result<DownloadOutcome, DownloadError>) {
    let template = if result.is_ok() {
        "{msg:.cyan/blue}"
    } else {
        "{msg:.red.bold}"
    };
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style);
    }
    match result {
        Ok(outcome) => pb.finish_with_message(format!(
            "😸 {} file(s) -> {}",
            outcome.files,
            outcome.target.display()
        )),
        Err(_) => pb.finish_with_message("😿 failed"),
    }
}
