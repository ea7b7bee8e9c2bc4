use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use normpath::PathExt;
use regex::Regex;

const INCLUDE_PATTERN: &str = r#"(?i)^#\s*include\s*([<"].*\.[hi]pp[">])$"#;

/// Follows `#include` directives from a set of sources into one library root.
#[derive(Debug)]
pub struct HeaderScanner {
    library_root: PathBuf,
    include: Regex,
}

/// Headers inside the library root reachable from the scanned sources.
#[derive(Debug, Clone, Default)]
pub struct HeaderClosure {
    library_root: PathBuf,
    headers: BTreeSet<PathBuf>,
    unreadable: Vec<PathBuf>,
    scanned: usize,
}

impl HeaderClosure {
    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    pub fn headers(&self) -> &BTreeSet<PathBuf> {
        &self.headers
    }

    /// Header paths relative to the library root, e.g. `boost/foreach.hpp`.
    pub fn relative_headers(&self) -> impl Iterator<Item = &Path> {
        self.headers
            .iter()
            .filter_map(|header| header.strip_prefix(&self.library_root).ok())
    }

    pub fn unreadable(&self) -> &[PathBuf] {
        &self.unreadable
    }

    pub fn scanned(&self) -> usize {
        self.scanned
    }
}

struct PendingFile {
    path: PathBuf,
    in_library: bool,
}

impl HeaderScanner {
    pub fn new(library_root: &Path) -> Result<Self> {
        let library_root = library_root
            .normalize()
            .with_context(|| format!("normalizing library root {}", library_root.display()))?
            .into_path_buf();
        let include = Regex::new(INCLUDE_PATTERN).context("compiling include pattern")?;
        Ok(HeaderScanner {
            library_root,
            include,
        })
    }

    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    /// Breadth-first walk over the include graph. Every file is read at most
    /// once; a source that cannot be read is logged and skipped.
    pub fn scan<I>(&self, sources: I) -> HeaderClosure
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut closure = HeaderClosure {
            library_root: self.library_root.clone(),
            ..HeaderClosure::default()
        };
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut queue: VecDeque<PendingFile> = sources
            .into_iter()
            .map(|path| PendingFile {
                path,
                in_library: false,
            })
            .collect();

        while let Some(file) = queue.pop_front() {
            if !visited.insert(file.path.clone()) {
                continue;
            }

            let bytes = match fs::read(&file.path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("skipping {}: {err}", file.path.display());
                    closure.unreadable.push(file.path);
                    continue;
                }
            };
            closure.scanned += 1;

            let text = String::from_utf8_lossy(&bytes);
            let including_dir = file.path.parent().unwrap_or(Path::new(""));
            for line in text.lines() {
                let Some(target) = self
                    .include
                    .captures(line.trim_end())
                    .and_then(|caps| caps.get(1))
                else {
                    continue;
                };

                let Some(header) = self.resolve(target.as_str(), including_dir, file.in_library)
                else {
                    continue;
                };
                if !header.starts_with(&self.library_root) {
                    continue;
                }

                if closure.headers.insert(header.clone()) {
                    debug!("{} includes {}", file.path.display(), header.display());
                    queue.push_back(PendingFile {
                        path: header,
                        in_library: true,
                    });
                }
            }
        }

        closure
    }

    /// `<x.hpp>` is looked up in the library root only. `"x.hpp"` inside a
    /// library header may also be relative to that header.
    fn resolve(&self, target: &str, including_dir: &Path, in_library: bool) -> Option<PathBuf> {
        let relative = target.get(1..target.len() - 1)?;
        let mut dirs = vec![self.library_root.as_path()];
        if in_library && target.starts_with('"') {
            dirs.push(including_dir);
        }

        dirs.into_iter()
            .map(|dir| dir.join(relative))
            .find(|candidate| candidate.is_file())
            .and_then(|candidate| candidate.normalize().ok())
            .map(|normalized| normalized.into_path_buf())
    }
}
