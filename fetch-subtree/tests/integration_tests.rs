//! End-to-end tests for the fetch-subtree library.
//!
//! A local HTTP server stands in for the repository host and serves zip archives built by the
//! tests, so these run offline.

use std::io::Write;
use std::path::{Path, PathBuf};

use fetch_subtree::{
    AcquireConfig, CancelToken, DownloadRequest, Downloader, DownloaderConfig, ErrorKind,
    ExtractOptions, Locator, OverwritePolicy,
};
use httpmock::prelude::*;
use zip::write::SimpleFileOptions;

/// A repository archive as the host would produce it for `widgets` at `main`.
fn widgets_archive() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o644);
    writer.add_directory("widgets-main/", options).unwrap();
    for (name, body) in [
        ("widgets-main/README.md", "# widgets\n"),
        ("widgets-main/Cargo.toml", "[package]\nname = \"widgets\"\n"),
        ("widgets-main/src/lib.rs", "pub fn widget() {}\n"),
        ("widgets-main/src/parts/gear.rs", "pub struct Gear;\n"),
        ("widgets-main/source-notes.txt", "not under src\n"),
    ] {
        writer.start_file(name, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

struct Host {
    server: MockServer,
    scratch: tempfile::TempDir,
}

impl Host {
    fn serving_widgets() -> Self {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/octo/widgets/archive/main.zip");
            then.status(200).body(widgets_archive());
        });
        server.mock(|when, then| {
            when.method(GET);
            then.status(404);
        });
        Self {
            server,
            scratch: tempfile::tempdir().unwrap(),
        }
    }

    fn downloader(&self, overwrite: OverwritePolicy) -> Downloader {
        Downloader::new(DownloaderConfig {
            acquire: AcquireConfig {
                base_url: self.server.base_url(),
                scratch_dir: self.scratch.path().to_path_buf(),
                ..Default::default()
            },
            extract: ExtractOptions { overwrite },
        })
        .unwrap()
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
    }
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(next) = pending.pop() {
        for entry in std::fs::read_dir(next).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(path.strip_prefix(dir).unwrap().to_path_buf());
            }
        }
    }
    found.sort();
    found
}

fn fetch(host: &Host, locator: &str, target: &Path) -> Result<usize, fetch_subtree::DownloadError> {
    let locator = Locator::parse(locator).unwrap();
    host.downloader(OverwritePolicy::Refuse)
        .download(&DownloadRequest::new(&locator, target), &CancelToken::new())
        .map(|outcome| outcome.files)
}

#[test]
fn test_fetch_whole_repository() {
    let host = Host::serving_widgets();
    let out = tempfile::tempdir().unwrap();

    assert_eq!(fetch(&host, "github:octo/widgets", out.path()).unwrap(), 5);
    assert_eq!(
        files_under(out.path()),
        [
            "Cargo.toml",
            "README.md",
            "source-notes.txt",
            "src/lib.rs",
            "src/parts/gear.rs"
        ]
        .map(PathBuf::from)
    );
    assert!(host.scratch_is_empty());
}

#[test]
fn test_fetch_directory_both_locator_forms() {
    let host = Host::serving_widgets();
    for locator in ["github:octo/widgets/src@main", "github:octo/widgets@main/src"] {
        let out = tempfile::tempdir().unwrap();
        assert_eq!(fetch(&host, locator, out.path()).unwrap(), 2, "{locator}");
        assert_eq!(
            files_under(out.path()),
            ["lib.rs", "parts/gear.rs"].map(PathBuf::from),
            "{locator}"
        );
    }
}

#[test]
fn test_fetch_single_file_into_new_directory() {
    let host = Host::serving_widgets();
    let out = tempfile::tempdir().unwrap();
    let target = out.path().join("vendor/widgets");

    assert_eq!(fetch(&host, "github:octo/widgets/Cargo.toml", &target).unwrap(), 1);
    assert_eq!(
        std::fs::read_to_string(target.join("Cargo.toml")).unwrap(),
        "[package]\nname = \"widgets\"\n"
    );
}

#[test]
fn test_unknown_reference() {
    let host = Host::serving_widgets();
    let out = tempfile::tempdir().unwrap();

    let err = fetch(&host, "github:octo/widgets@no-such-branch", out.path()).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::ReferenceOrRepositoryNotFound);
    assert!(host.scratch_is_empty());
}

#[test]
fn test_unknown_path() {
    let host = Host::serving_widgets();
    let out = tempfile::tempdir().unwrap();

    let err = fetch(&host, "github:octo/widgets/lib", out.path()).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::PathNotFoundInArchive);
    assert!(err.to_string().contains("failed to extract"));
    assert!(host.scratch_is_empty());
}

#[test]
fn test_refuse_then_overwrite() {
    let host = Host::serving_widgets();
    let out = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new(
        &Locator::parse("github:octo/widgets/README.md").unwrap(),
        out.path(),
    );
    std::fs::write(out.path().join("README.md"), "local\n").unwrap();

    let err = host
        .downloader(OverwritePolicy::Refuse)
        .download(&request, &CancelToken::new())
        .unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::ExtractIoFailure);
    assert_eq!(std::fs::read_to_string(out.path().join("README.md")).unwrap(), "local\n");

    host.downloader(OverwritePolicy::Overwrite)
        .download(&request, &CancelToken::new())
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(out.path().join("README.md")).unwrap(),
        "# widgets\n"
    );
    assert!(host.scratch_is_empty());
}
