use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::name::LibraryName;

/// Ordered list of directories consulted when resolving a DLL name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        SearchPath {
            dirs: dirs.into_iter().collect(),
        }
    }

    /// `PATH` followed by the directories Windows searches implicitly.
    pub fn from_env() -> Self {
        Self::from_vars(env::var_os("PATH"), env::var_os("SystemRoot"))
    }

    pub fn from_vars(path: Option<OsString>, system_root: Option<OsString>) -> Self {
        let mut dirs: Vec<PathBuf> = path
            .as_deref()
            .map(|value| {
                env::split_paths(value)
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if let Some(root) = system_root {
            let root = PathBuf::from(root);
            dirs.push(root.join("SysWOW64"));
            dirs.push(root.join("system32"));
        }

        SearchPath { dirs }
    }

    /// Returns a copy with `dirs` searched before the existing entries.
    pub fn with_leading(&self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut combined: Vec<PathBuf> = dirs.into_iter().collect();
        combined.extend(self.dirs.iter().cloned());
        SearchPath { dirs: combined }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Every file on the search path named `name`, in search order.
    pub fn candidates<'a>(&'a self, name: &'a LibraryName) -> impl Iterator<Item = PathBuf> + 'a {
        self.dirs.iter().filter_map(move |dir| find_in_dir(dir, name))
    }
}

/// Looks for `name` in `dir`, falling back to a case-insensitive scan so
/// lookups behave like Windows on case-sensitive file systems.
pub fn find_in_dir(dir: &Path, name: &LibraryName) -> Option<PathBuf> {
    let exact = dir.join(name.as_str());
    if exact.is_file() {
        return Some(exact);
    }

    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .find(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|file_name| file_name.eq_ignore_ascii_case(name.folded()))
        })
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn from_vars_appends_system_directories() {
        let joined = env::join_paths(["/opt/a", "/opt/b"]).unwrap();
        let search = SearchPath::from_vars(Some(joined), Some(OsString::from("/windows")));
        assert_eq!(
            search.dirs(),
            &[
                PathBuf::from("/opt/a"),
                PathBuf::from("/opt/b"),
                PathBuf::from("/windows").join("SysWOW64"),
                PathBuf::from("/windows").join("system32"),
            ]
        );
    }

    #[test]
    fn from_vars_without_environment_is_empty() {
        assert!(SearchPath::from_vars(None, None).dirs().is_empty());
    }

    #[test]
    fn candidates_follow_search_order_and_ignore_case() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        fs::write(first.path().join("ZLIB1.DLL"), b"x").unwrap();
        fs::write(second.path().join("zlib1.dll"), b"y").unwrap();

        let search = SearchPath::new([first.path().to_path_buf(), second.path().to_path_buf()]);
        let name = LibraryName::new("zlib1.dll");
        let found: Vec<_> = search.candidates(&name).collect();
        assert_eq!(found.len(), 2);
        assert!(found[0].starts_with(first.path()));
        assert!(found[1].starts_with(second.path()));
    }

    #[test]
    fn with_leading_puts_new_dirs_first() {
        let search = SearchPath::new([PathBuf::from("/b")]).with_leading([PathBuf::from("/a")]);
        assert_eq!(search.dirs(), &[PathBuf::from("/a"), PathBuf::from("/b")]);
    }
}
