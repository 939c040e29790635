//! Selecting a subset of a repository archive and writing it under a target directory.
//!
//! Every archive entry is planned before anything is written: its name is matched against the
//! [`SelectionPrefix`], its destination is computed and checked to lie inside the target
//! directory. Only then are directories created and files written. An archive with an entry that
//! escapes the target directory is therefore rejected before any of it reaches the disk.

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;

use crate::error::ExtractError;
use crate::helper::{CancelToken, CopyError, copy_cancellable};

/// The path of the requested node inside the archive: the archive's top-level directory
/// (conventionally `{repo}-{ref}`), optionally followed by a path within the repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectionPrefix(String);

impl SelectionPrefix {
    /// The prefix for `path` in the archive of `repo` at `reference`. An empty path selects the
    /// whole repository.
    pub fn new(repo: &str, reference: &str, path: &str) -> Self {
        Self::under_root(&format!("{repo}-{reference}"), path)
    }

    /// The prefix for `path` under the archive directory `root`.
    pub fn under_root(root: &str, path: &str) -> Self {
        let path = normalise_entry_name(path);
        let path = path.trim_matches('/');
        if path.is_empty() {
            Self(root.to_string())
        } else {
            Self(format!("{root}/{path}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The archive's top-level directory.
    pub fn root(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    /// The same path under a different top-level directory.
    pub fn with_root(&self, root: &str) -> Self {
        match self.0.split_once('/') {
            Some((_, path)) => Self::under_root(root, path),
            None => Self(root.to_string()),
        }
    }

    /// Whether the (normalised) entry name is the selected node or lies beneath it. Matching is by
    /// whole path segments: `repo-main/src` doesn't match `repo-main/source-file.txt`.
    pub fn matches(&self, entry: &str) -> bool {
        entry == self.0
            || entry
                .strip_prefix(self.0.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// The part of `entry` below the selected node: empty for the node itself. Must only be
    /// called for entries which [match](SelectionPrefix::matches).
    pub fn relative_path<'a>(&self, entry: &'a str) -> Result<&'a str, ExtractError> {
        if entry == self.0 {
            return Ok("");
        }
        entry
            .strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| ExtractError::InvalidSelection {
                entry: entry.to_string(),
                prefix: self.0.clone(),
            })
    }
}

impl From<&str> for SelectionPrefix {
    fn from(prefix: &str) -> Self {
        Self(normalise_entry_name(prefix).trim_end_matches('/').to_string())
    }
}

impl std::fmt::Display for SelectionPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether existing files may be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Fail with [`ExtractError::DestinationExists`] if a file is already present.
    #[default]
    Refuse,
    /// Truncate and rewrite existing files.
    Overwrite,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub overwrite: OverwritePolicy,
}

/// What an extraction wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extracted {
    pub files: usize,
    pub directories: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    File,
    Directory,
}

/// One archive entry selected for extraction.
#[derive(Debug)]
pub(crate) struct ExtractedEntry {
    index: usize,
    name: String,
    destination: PathBuf,
    kind: EntryKind,
    mode: Option<u32>,
}

#[derive(Debug, Default)]
struct Plan {
    matched: usize,
    directories: Vec<ExtractedEntry>,
    files: Vec<ExtractedEntry>,
}

/// Extracts the entries under a [`SelectionPrefix`] from a zip archive.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Extract everything in `archive` at or under `prefix` into `target`, creating `target` if
    /// necessary. Returns the number of files and directories written.
    ///
    /// Fails with [`ExtractError::PathNotFound`] if no entry matches, and with
    /// [`ExtractError::PathTraversal`] if any matching entry would land outside `target`.
    pub fn extract<P, Q>(
        &self,
        archive: P,
        prefix: &SelectionPrefix,
        target: Q,
        cancel: &CancelToken,
    ) -> Result<Extracted, ExtractError>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let (archive_path, target) = (archive.as_ref(), target.as_ref());
        fs::create_dir_all(target)
            .map_err(|err| ExtractError::io("create directory", target, err))?;
        let root = fs::canonicalize(target)
            .map_err(|err| ExtractError::io("resolve directory", target, err))?;

        let mut zip = open_archive(archive_path)?;
        let plan = plan_extraction(&mut zip, archive_path, prefix, &root, cancel)?;
        if plan.matched == 0 {
            return Err(ExtractError::PathNotFound {
                prefix: prefix.to_string(),
            });
        }

        for dir in &plan.directories {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }
            create_directory(dir)?;
        }

        let policy = self.options.overwrite;
        #[cfg(feature = "rayon")]
        let files = {
            drop(zip);
            parallel::write_files(archive_path, &plan.files, policy, cancel)?
        };
        #[cfg(not(feature = "rayon"))]
        let files = serial::write_files(&mut zip, archive_path, &plan.files, policy, cancel)?;

        tracing::info!(
            files,
            directories = plan.directories.len(),
            "extracted '{prefix}' into {}",
            target.display()
        );
        Ok(Extracted {
            files,
            directories: plan.directories.len(),
        })
    }
}

/// The single top-level directory shared by every entry in the archive, if there is one.
pub fn archive_root<P: AsRef<Path>>(archive: P) -> Result<Option<String>, ExtractError> {
    let archive_path = archive.as_ref();
    let mut zip = open_archive(archive_path)?;
    let mut root: Option<String> = None;
    for index in 0..zip.len() {
        let entry = zip.by_index_raw(index).map_err(|err| ExtractError::Archive {
            path: archive_path.to_path_buf(),
            err,
        })?;
        let name = normalise_entry_name(entry.name());
        let first = name.split('/').next().unwrap_or_default();
        match &root {
            _ if first.is_empty() => return Ok(None),
            None => root = Some(first.to_string()),
            Some(existing) if existing != first => return Ok(None),
            Some(_) => {}
        }
    }
    Ok(root)
}

/// Forward slashes only, no trailing slash.
fn normalise_entry_name(name: &str) -> String {
    name.replace('\\', "/").trim_end_matches('/').to_string()
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>, ExtractError> {
    let file = File::open(path).map_err(|err| ExtractError::io("open archive", path, err))?;
    ZipArchive::new(file).map_err(|err| ExtractError::Archive {
        path: path.to_path_buf(),
        err,
    })
}

fn plan_extraction(
    zip: &mut ZipArchive<File>,
    archive_path: &Path,
    prefix: &SelectionPrefix,
    root: &Path,
    cancel: &CancelToken,
) -> Result<Plan, ExtractError> {
    let mut plan = Plan::default();
    for index in 0..zip.len() {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        let entry = zip.by_index_raw(index).map_err(|err| ExtractError::Archive {
            path: archive_path.to_path_buf(),
            err,
        })?;
        let name = normalise_entry_name(entry.name());
        if !prefix.matches(&name) {
            continue;
        }
        plan.matched += 1;

        let kind = if entry.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let relative = prefix.relative_path(&name)?;
        // The selected directory itself: its contents go straight into the target
        if relative.is_empty() && kind == EntryKind::Directory {
            continue;
        }
        // The selected file itself keeps its own name
        let relative = if relative.is_empty() {
            name.rsplit('/').next().unwrap_or_default()
        } else {
            relative
        };

        let destination =
            contained_destination(root, Path::new(relative)).ok_or_else(|| {
                ExtractError::PathTraversal {
                    entry: entry.name().to_string(),
                    target: root.to_path_buf(),
                }
            })?;
        tracing::debug!("planned {name} -> {}", destination.display());

        let planned = ExtractedEntry {
            index,
            destination,
            kind,
            mode: match kind {
                EntryKind::Directory => entry.unix_mode(),
                EntryKind::File => regular_file_mode(entry.unix_mode()),
            },
            name,
        };
        match kind {
            EntryKind::Directory => plan.directories.push(planned),
            EntryKind::File => plan.files.push(planned),
        }
    }
    Ok(plan)
}

/// Resolve `relative` against the canonical directory `root`. Returns `None` unless the result is
/// `root` itself or lies beneath it, after resolving `..` lexically and any existing symlinks on
/// disk.
fn contained_destination(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if !resolved.starts_with(root) {
        return None;
    }

    // An existing symlink anywhere along the way could point elsewhere
    let mut existing = resolved.as_path();
    while fs::symlink_metadata(existing).is_err() {
        existing = existing.parent()?;
    }
    let canonical = fs::canonicalize(existing).ok()?;
    canonical.starts_with(root).then_some(resolved)
}

const FILE_TYPE_MASK: u32 = 0o170000;
const REGULAR_FILE: u32 = 0o100000;

/// The stored mode of a regular file. Symlinks and other special entries are written as plain
/// files and get the default mode instead of their own.
fn regular_file_mode(mode: Option<u32>) -> Option<u32> {
    mode.filter(|m| matches!(m & FILE_TYPE_MASK, 0 | REGULAR_FILE))
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<(), ExtractError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|err| ExtractError::io("set permissions on", path, err))
}

fn create_directory(dir: &ExtractedEntry) -> Result<(), ExtractError> {
    fs::create_dir_all(&dir.destination)
        .map_err(|err| ExtractError::io("create directory", &dir.destination, err))?;
    // Keep the owner's bits so the directory's contents can still be written
    #[cfg(unix)]
    apply_mode(&dir.destination, dir.mode.map_or(0o755, |m| (m & 0o777) | 0o700))?;
    Ok(())
}

fn open_destination(
    path: &Path,
    mode: Option<u32>,
    policy: OverwritePolicy,
) -> Result<File, ExtractError> {
    let mut options = fs::OpenOptions::new();
    options.write(true);
    match policy {
        OverwritePolicy::Refuse => {
            options.create_new(true);
        }
        OverwritePolicy::Overwrite => {
            options.create(true).truncate(true);
        }
    }
    let file = options.open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::AlreadyExists {
            ExtractError::DestinationExists {
                path: path.to_path_buf(),
            }
        } else {
            ExtractError::io("create file", path, err)
        }
    })?;
    #[cfg(unix)]
    apply_mode(path, mode.map_or(0o644, |m| m & 0o777))?;
    #[cfg(not(unix))]
    let _ = mode;
    Ok(file)
}

fn write_file(
    zip: &mut ZipArchive<File>,
    archive_path: &Path,
    entry: &ExtractedEntry,
    policy: OverwritePolicy,
    cancel: &CancelToken,
) -> Result<(), ExtractError> {
    if cancel.is_cancelled() {
        return Err(ExtractError::Cancelled);
    }
    if let Some(parent) = entry.destination.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .map_err(|err| ExtractError::io("create directory", parent, err))?;
    }

    let mut source = zip
        .by_index(entry.index)
        .map_err(|err| ExtractError::Archive {
            path: archive_path.to_path_buf(),
            err,
        })?;
    let mut out = open_destination(&entry.destination, entry.mode, policy)?;
    match copy_cancellable(&mut source, &mut out, cancel) {
        Ok(size) => {
            tracing::debug!(size, "wrote {}", entry.destination.display());
            Ok(())
        }
        Err(err) => {
            drop(out);
            if let Err(cleanup) = fs::remove_file(&entry.destination) {
                tracing::warn!(
                    "failed to remove partially written {}: {cleanup}",
                    entry.destination.display()
                );
            }
            Err(match err {
                CopyError::Cancelled => ExtractError::Cancelled,
                CopyError::Read(err) => ExtractError::io("read archive entry", &entry.name, err),
                CopyError::Write(err) => ExtractError::io("write", &entry.destination, err),
            })
        }
    }
}

#[cfg_attr(feature = "rayon", allow(dead_code))]
pub(crate) mod serial {
    use super::*;

    pub fn write_files(
        zip: &mut ZipArchive<File>,
        archive_path: &Path,
        files: &[ExtractedEntry],
        policy: OverwritePolicy,
        cancel: &CancelToken,
    ) -> Result<usize, ExtractError> {
        for entry in files {
            write_file(zip, archive_path, entry, policy, cancel)?;
        }
        Ok(files.len())
    }
}

#[cfg(feature = "rayon")]
pub(crate) mod parallel {
    use super::*;
    use rayon::prelude::*;

    // Each worker reads through its own handle on the archive. Parent directories are created with
    // `create_dir_all`, which tolerates another worker having created them first.
    pub fn write_files(
        archive_path: &Path,
        files: &[ExtractedEntry],
        policy: OverwritePolicy,
        cancel: &CancelToken,
    ) -> Result<usize, ExtractError> {
        files.par_iter().try_for_each_init(
            || None,
            |slot: &mut Option<ZipArchive<File>>, entry| {
                if slot.is_none() {
                    *slot = Some(open_archive(archive_path)?);
                }
                match slot {
                    Some(zip) => write_file(zip, archive_path, entry, policy, cancel),
                    None => Ok(()),
                }
            },
        )?;
        Ok(files.len())
    }
}





#[cfg(test)]
mod test_archive_root {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn single_root_is_reported() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = sample_repo_zip(scratch.path());
        assert_eq!(archive_root(&archive).unwrap().as_deref(), Some("repo-main"));
    }

    #[test]
    fn several_roots_are_not() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("a.zip");
        write_zip(
            &archive,
            &[Item::File("one/a.txt", b"a"), Item::File("two/b.txt", b"b")],
        );
        assert_eq!(archive_root(&archive).unwrap(), None);
    }

    #[test]
    fn empty_archive_has_no_root() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("a.zip");
        write_zip(&archive, &[]);
        assert_eq!(archive_root(&archive).unwrap(), None);
    }
}
