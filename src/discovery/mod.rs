//! Work item discovery
//!
//! Finds test files below a root pattern. A root may contain one negated
//! segment `!(X)`: files directly matched by the root with `X` in that
//! position are dropped, while deeper or sibling files are kept.

mod glob;

pub use glob::path_match;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Discovery errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Cannot read test directory {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Include and exclude patterns derived from a root
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootPattern {
    pub include: String,
    pub exclude: Option<String>,
}

impl RootPattern {
    pub fn new(root: &str, suffix: &str) -> Self {
        match negated_segment(root) {
            Some((negation, excluded)) => {
                let included = root
                    .replace(&format!("{negation}/"), "*/")
                    .replace(negation, "");
                let excluded_root = root.replace(negation, excluded);

                Self {
                    include: format!("{included}**/*{suffix}"),
                    exclude: Some(format!("{excluded_root}**/*{suffix}")),
                }
            }
            None => Self {
                include: format!("{root}**/**/*{suffix}"),
                exclude: None,
            },
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = path.strip_prefix("./").unwrap_or(path);
        path_match(&self.include, path)
            && !self
                .exclude
                .as_deref()
                .is_some_and(|exclude| path_match(exclude, path))
    }
}

/// Find `!(X)`, returning the whole token and `X`
fn negated_segment(root: &str) -> Option<(&str, &str)> {
    let start = root.find("!(")?;
    let end = start + root[start..].find(')')?;
    Some((&root[start..=end], &root[start + 2..end]))
}

/// Keep the paths selected by `root`, in sorted order
pub fn filter_items<I, S>(paths: I, root: &str, suffix: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let pattern = RootPattern::new(root, suffix);
    let selected: BTreeSet<String> = paths
        .into_iter()
        .filter(|p| pattern.matches(p.as_ref()))
        .map(|p| p.as_ref().to_string())
        .collect();
    selected.into_iter().collect()
}

/// Find test files below `root`, relative to the working directory
pub fn find_items(root: &str, suffix: &str) -> Result<Vec<String>, DiscoveryError> {
    find_items_in(Path::new("."), root, suffix)
}

/// Find test files below `root`, relative to `base`
pub fn find_items_in(base: &Path, root: &str, suffix: &str) -> Result<Vec<String>, DiscoveryError> {
    let pattern = RootPattern::new(root, suffix);
    let start = glob::literal_dir(&pattern.include);

    let mut files = Vec::new();
    let start_dir = if start.is_empty() {
        base.to_path_buf()
    } else {
        base.join(start)
    };
    walk(&start_dir, start, &mut files)?;

    debug!(
        "Scanned {} files under {}, pattern {:?}",
        files.len(),
        start_dir.display(),
        pattern
    );

    Ok(filter_items(files, root, suffix))
}

/// Collect non-hidden files below `dir`, naming them relative to the scan base
fn walk(dir: &Path, prefix: &str, files: &mut Vec<String>) -> Result<(), DiscoveryError> {
    let unreadable = |source| DiscoveryError::Unreadable {
        path: dir.to_path_buf(),
        source,
    };

    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        let file_type = entry.file_type().map_err(unreadable)?;
        if file_type.is_dir() {
            walk(&entry.path(), &relative, files)?;
        } else if file_type.is_file() || file_type.is_symlink() {
            files.push(relative);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SUFFIX: &str = "_test.rb";

    fn write(base: &Path, relative: &str) {
        let path = base.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "# test").unwrap();
    }

    fn layout() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for file in [
            "x1_test.rb",
            "x2_test.rb",
            "sub1/x3_test.rb",
            "sub1/x4_test.rb",
            "sub1/sub2/x5_test.rb",
            "sub1/sub2/x6_test.rb",
            "sub3/sub2/x7_test.rb",
            "sub3/sub2/x8_test.rb",
            "sub3/helper.rb",
        ] {
            write(dir.path(), file);
        }
        dir
    }

    fn names(items: &[String]) -> Vec<&str> {
        items
            .iter()
            .map(|p| p.rsplit('/').next().unwrap_or(p))
            .collect()
    }

    #[test]
    fn test_root_pattern_plain() {
        let pattern = RootPattern::new("test/", SUFFIX);
        assert_eq!(pattern.include, "test/**/**/*_test.rb");
        assert!(pattern.exclude.is_none());
    }

    #[test]
    fn test_root_pattern_negated() {
        let pattern = RootPattern::new("!(sub1)/sub2", SUFFIX);
        assert_eq!(pattern.include, "*/sub2**/*_test.rb");
        assert_eq!(pattern.exclude.as_deref(), Some("sub1/sub2**/*_test.rb"));
    }

    #[test]
    fn test_exclusion_keeps_nested_and_siblings() {
        let items = filter_items(
            ["sub1/a_test.rb", "sub1/sub2/b_test.rb", "sub3/sub2/c_test.rb"],
            "!(sub1)",
            SUFFIX,
        );
        assert_eq!(items, vec!["sub1/sub2/b_test.rb", "sub3/sub2/c_test.rb"]);
    }

    #[test]
    fn test_filter_ignores_other_suffixes() {
        let items = filter_items(["a_test.rb", "a.rb", "lib/b_test.rb"], "", SUFFIX);
        assert_eq!(items, vec!["a_test.rb", "lib/b_test.rb"]);
    }

    #[test]
    fn test_find_everything() {
        let dir = layout();
        let items = find_items_in(dir.path(), "", SUFFIX).unwrap();
        assert_eq!(items.len(), 8);
    }

    #[test]
    fn test_find_excluding_top_level_dir() {
        let dir = layout();
        let items = find_items_in(dir.path(), "!(sub1)", SUFFIX).unwrap();
        assert_eq!(
            names(&items),
            vec![
                "x5_test.rb",
                "x6_test.rb",
                "x7_test.rb",
                "x8_test.rb",
                "x1_test.rb",
                "x2_test.rb"
            ]
        );
    }

    #[test]
    fn test_find_excluding_nested_dir() {
        let dir = layout();
        let items = find_items_in(dir.path(), "sub1/!(sub2)", SUFFIX).unwrap();
        assert_eq!(items, vec!["sub1/x3_test.rb", "sub1/x4_test.rb"]);
    }

    #[test]
    fn test_find_excluding_parent_of_nested_dir() {
        let dir = layout();
        let items = find_items_in(dir.path(), "!(sub1)/sub2", SUFFIX).unwrap();
        assert_eq!(items, vec!["sub3/sub2/x7_test.rb", "sub3/sub2/x8_test.rb"]);
    }

    #[test]
    fn test_find_under_prefix() {
        let dir = layout();
        let items = find_items_in(dir.path(), "sub3/", SUFFIX).unwrap();
        assert_eq!(items, vec!["sub3/sub2/x7_test.rb", "sub3/sub2/x8_test.rb"]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = tempdir().unwrap();
        let err = find_items_in(dir.path(), "nope/", SUFFIX).unwrap_err();
        assert!(matches!(err, DiscoveryError::Unreadable { .. }));
    }
}
