//! Parsing compact repository locators such as `github:owner/repo/path@ref`.

use crate::error::ErrorKind;
use crate::extract::SelectionPrefix;

/// The scheme every locator must start with.
pub const SCHEME: &str = "github:";

/// The reference used when a locator doesn't name one.
pub const DEFAULT_REFERENCE: &str = "main";

/// Errors encountered when parsing a locator string. These never touch the network.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LocatorError {
    /// The scheme is missing or the locator has too few components.
    #[error("invalid locator '{input}': expected {SCHEME}owner/repo[@ref][/path]")]
    Malformed { input: String },

    #[error("invalid locator '{input}': the repository owner is required")]
    MissingOwner { input: String },

    #[error("invalid locator '{input}': the repository name is required")]
    MissingRepo { input: String },
}

impl LocatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed { .. } => ErrorKind::MalformedLocator,
            Self::MissingOwner { .. } => ErrorKind::MissingOwner,
            Self::MissingRepo { .. } => ErrorKind::MissingRepo,
        }
    }
}

/// A best-effort guess at what a locator's path refers to.
///
/// An extensionless file looks exactly like a directory, so this is only used to pick a default
/// destination before the archive is consulted. The archive contents decide what is extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

/// A path inside a repository at a given reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    owner: String,
    repo: String,
    path: String,
    reference: String,
}

impl Locator {
    /// Parse a locator in either of the equivalent forms:
    ///
    /// - `github:owner/repo[@ref][/path]`
    /// - `github:owner/repo/path[@ref]`
    ///
    /// An omitted or empty reference becomes [`DEFAULT_REFERENCE`]. The path is stored verbatim.
    pub fn parse(input: &str) -> Result<Self, LocatorError> {
        let Some(rest) = input.strip_prefix(SCHEME) else {
            return Err(LocatorError::Malformed {
                input: input.to_string(),
            });
        };

        let (owner_repo_path, reference) = match rest.split_once('@') {
            None => (rest.to_string(), ""),
            // A slash after the reference means the path came after it: reattach the path
            Some((head, tail)) => match tail.split_once('/') {
                Some((reference, path)) => (format!("{head}/{path}"), reference),
                None => (head.to_string(), tail),
            },
        };

        let mut parts = owner_repo_path.splitn(3, '/');
        let owner = parts.next().unwrap_or_default();
        let Some(repo) = parts.next() else {
            return Err(if owner.is_empty() {
                LocatorError::Malformed {
                    input: input.to_string(),
                }
            } else {
                LocatorError::MissingRepo {
                    input: input.to_string(),
                }
            });
        };
        let path = parts.next().unwrap_or_default();

        if owner.is_empty() {
            return Err(LocatorError::MissingOwner {
                input: input.to_string(),
            });
        }
        if repo.is_empty() {
            return Err(LocatorError::MissingRepo {
                input: input.to_string(),
            });
        }

        let reference = if reference.is_empty() {
            DEFAULT_REFERENCE
        } else {
            reference
        };

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.to_string(),
            reference: reference.to_string(),
        })
    }

    /// Build a locator from its components, applying the same rules as [`Locator::parse`].
    pub fn from_parts(
        owner: &str,
        repo: &str,
        path: &str,
        reference: Option<&str>,
    ) -> Result<Self, LocatorError> {
        let input = || format!("{SCHEME}{owner}/{repo}");
        if owner.is_empty() {
            return Err(LocatorError::MissingOwner { input: input() });
        }
        if repo.is_empty() {
            return Err(LocatorError::MissingRepo { input: input() });
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.to_string(),
            reference: reference
                .filter(|r| !r.is_empty())
                .unwrap_or(DEFAULT_REFERENCE)
                .to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// The path within the repository, exactly as written. Empty means the whole repository.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The branch, tag or commit.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// `owner/repo`
    pub fn full_repo_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Guess whether the path names a file or a directory.
    ///
    /// A trailing `/` means a directory. Otherwise a final segment containing a `.` is taken to be
    /// a file, and anything else (including the empty path) a directory. Directories with dots in
    /// their names and files without extensions are misclassified.
    pub fn kind(&self) -> PathKind {
        if self.path.is_empty() || self.path.ends_with('/') {
            return PathKind::Directory;
        }
        let file_name = self.path.rsplit('/').next().unwrap_or_default();
        if file_name.contains('.') {
            PathKind::File
        } else {
            PathKind::Directory
        }
    }

    /// The URL of the zip archive of this locator's reference: `{base}/{owner}/{repo}/archive/{ref}.zip`.
    ///
    /// Returns `None` if `base` cannot have path segments appended.
    pub fn archive_url(&self, base: &url::Url) -> Option<url::Url> {
        let archive_name = format!("{}.zip", self.reference);
        let mut url = base.clone();
        url.path_segments_mut().ok()?.pop_if_empty().extend([
            self.owner.as_str(),
            self.repo.as_str(),
            "archive",
            archive_name.as_str(),
        ]);
        Some(url)
    }

    /// The prefix selecting this locator's path inside the repository archive.
    pub fn selection_prefix(&self) -> SelectionPrefix {
        SelectionPrefix::new(&self.repo, &self.reference, &self.path)
    }
}

impl std::str::FromStr for Locator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.owner, self.repo)?;
        if self.reference != DEFAULT_REFERENCE {
            write!(f, "@{}", self.reference)?;
        }
        if !self.path.is_empty() {
            write!(f, "/{}", self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
use LocatorError::*;

#[cfg(test)]
mod test_parse_locator {
    use super::*;

    fn locator(owner: &str, repo: &str, path: &str, reference: &str) -> Locator {
        Locator {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.to_string(),
            reference: reference.to_string(),
        }
    }

    #[test]
    fn parse_owner_and_repo() {
        assert_eq!(
            Locator::parse("github:octo/widgets"),
            Ok(locator("octo", "widgets", "", "main"))
        );
    }

    #[test]
    fn parse_path_without_ref() {
        assert_eq!(
            Locator::parse("github:octo/widgets/src/lib.rs"),
            Ok(locator("octo", "widgets", "src/lib.rs", "main"))
        );
    }

    #[test]
    fn parse_ref_without_path() {
        assert_eq!(
            Locator::parse("github:octo/widgets@v1.0.0"),
            Ok(locator("octo", "widgets", "", "v1.0.0"))
        );
    }

    #[test]
    fn ref_before_and_after_path_are_equivalent() {
        let before = Locator::parse("github:octo/widgets@develop/docs/guide").unwrap();
        let after = Locator::parse("github:octo/widgets/docs/guide@develop").unwrap();
        assert_eq!(before, after);
        assert_eq!(before, locator("octo", "widgets", "docs/guide", "develop"));
    }

    #[test]
    fn commit_hash_is_accepted_as_ref() {
        let parsed = Locator::parse("github:octo/widgets@3f9c2ab/README.md").unwrap();
        assert_eq!(parsed.reference(), "3f9c2ab");
        assert_eq!(parsed.path(), "README.md");
    }

    #[test]
    fn empty_ref_defaults_to_main() {
        let parsed = Locator::parse("github:octo/widgets@").unwrap();
        assert_eq!(parsed.reference(), DEFAULT_REFERENCE);
        let parsed = Locator::parse("github:octo/widgets@/docs").unwrap();
        assert_eq!(parsed.reference(), DEFAULT_REFERENCE);
        assert_eq!(parsed.path(), "docs");
    }

    #[test]
    fn trailing_slash_is_preserved() {
        let parsed = Locator::parse("github:octo/widgets/docs/").unwrap();
        assert_eq!(parsed.path(), "docs/");
    }

    #[test]
    fn parse_via_from_str() {
        let parsed: Locator = "github:octo/widgets/a/b".parse().unwrap();
        assert_eq!(parsed.path(), "a/b");
    }

    #[test]
    fn display_is_canonical() {
        let parsed = Locator::parse("github:octo/widgets/docs@dev").unwrap();
        assert_eq!(parsed.to_string(), "github:octo/widgets@dev/docs");
        let parsed = Locator::parse("github:octo/widgets/docs").unwrap();
        assert_eq!(parsed.to_string(), "github:octo/widgets/docs");
        assert_eq!(Locator::parse(&parsed.to_string()), Ok(parsed));
    }
}

#[cfg(test)]
mod test_parse_locator_failure_modes {
    use super::*;

    #[test]
    fn wrong_scheme_is_malformed() {
        let result = Locator::parse("bad-scheme:x/y");
        assert!(matches!(result, Err(Malformed { input }) if input == "bad-scheme:x/y"));
    }

    #[test]
    fn no_scheme_is_malformed() {
        assert!(matches!(Locator::parse("octo/widgets"), Err(Malformed { .. })));
    }

    #[test]
    fn empty_locator_is_malformed() {
        assert!(matches!(Locator::parse("github:"), Err(Malformed { .. })));
    }

    #[test]
    fn owner_only_is_missing_repo() {
        let err = Locator::parse("github:onlyowner").unwrap_err();
        assert!(matches!(err, MissingRepo { .. }));
        assert_eq!(err.kind(), ErrorKind::MissingRepo);
    }

    #[test]
    fn empty_repo_is_missing_repo() {
        assert!(matches!(Locator::parse("github:octo/"), Err(MissingRepo { .. })));
    }

    #[test]
    fn empty_owner_is_missing_owner() {
        let err = Locator::parse("github:/widgets").unwrap_err();
        assert!(matches!(err, MissingOwner { .. }));
        assert_eq!(err.kind(), ErrorKind::MissingOwner);
    }
}

#[cfg(test)]
mod test_path_kind {
    use super::*;

    fn kind_of(input: &str) -> PathKind {
        Locator::parse(input).unwrap().kind()
    }

    #[test]
    fn empty_path_is_directory() {
        assert_eq!(kind_of("github:octo/widgets"), PathKind::Directory);
    }

    #[test]
    fn trailing_slash_is_directory() {
        assert_eq!(kind_of("github:octo/widgets/config.d/"), PathKind::Directory);
    }

    #[test]
    fn extension_is_file() {
        assert_eq!(kind_of("github:octo/widgets/docs/guide.md"), PathKind::File);
        assert_eq!(kind_of("github:octo/widgets/data.json@v2"), PathKind::File);
    }

    #[test]
    fn extensionless_is_directory() {
        // Known misclassification: Makefile is a file
        assert_eq!(kind_of("github:octo/widgets/Makefile"), PathKind::Directory);
        assert_eq!(kind_of("github:octo/widgets/src"), PathKind::Directory);
    }

    #[test]
    fn dot_in_parent_does_not_count() {
        assert_eq!(kind_of("github:octo/widgets/v1.2/src"), PathKind::Directory);
    }
}
