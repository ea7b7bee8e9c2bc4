use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// File whose presence marks a directory as the Boost include root.
pub const DEFAULT_MARKER: &str = "boost/version.hpp";

/// Every `.cpp` under `source_dir`, plus the ones already vendored under
/// `output_dir/libs` (compiled Boost libraries pull in headers too).
pub fn collect_sources(source_dir: &Path, output_dir: &Path) -> Vec<PathBuf> {
    let mut sources: Vec<PathBuf> = [source_dir.to_path_buf(), output_dir.join("libs")]
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|res| res.ok()))
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("cpp"))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    sources.sort();
    sources.dedup();
    sources
}

/// First directory on an `INCLUDE`-style list that contains `marker`.
pub fn locate_library_root(include: Option<&OsStr>, marker: &Path) -> Option<PathBuf> {
    env::split_paths(include?).find(|dir| !dir.as_os_str().is_empty() && dir.join(marker).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn collects_cpp_files_from_sources_and_vendored_libs() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("vendor");
        fs::create_dir_all(src.join("UI")).unwrap();
        fs::create_dir_all(out.join("libs/filesystem")).unwrap();
        fs::write(src.join("Game.cpp"), "").unwrap();
        fs::write(src.join("UI/Menu.CPP"), "").unwrap();
        fs::write(src.join("Game.hpp"), "").unwrap();
        fs::write(out.join("libs/filesystem/path.cpp"), "").unwrap();
        fs::write(out.join("stray.cpp"), "").unwrap();

        let found = collect_sources(&src, &out);
        assert_eq!(
            found,
            vec![
                src.join("Game.cpp"),
                src.join("UI/Menu.CPP"),
                out.join("libs/filesystem/path.cpp"),
            ]
        );
    }

    #[test]
    fn locates_the_first_matching_include_dir() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        let third = dir.path().join("third");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(second.join("boost")).unwrap();
        fs::create_dir_all(third.join("boost")).unwrap();
        fs::write(second.join("boost/version.hpp"), "").unwrap();
        fs::write(third.join("boost/version.hpp"), "").unwrap();

        let include = env::join_paths([&first, &second, &third]).unwrap();
        assert_eq!(
            locate_library_root(Some(include.as_os_str()), Path::new(DEFAULT_MARKER)),
            Some(second)
        );
        assert_eq!(locate_library_root(None, Path::new(DEFAULT_MARKER)), None);
    }
}
