use std::fs;
use std::path::{Path, PathBuf};

use gcamp_formats::Machine;
use log::{debug, warn};
use serde::Serialize;

use crate::closure::{DependencyClosure, Resolution};
use crate::error::CopyError;
use crate::name::LibraryName;

/// Name the debug helper is installed under, whatever the redist file is called.
pub const DEBUG_HELPER_NAME: &str = "dbghelp.dll";

/// Directory holding the redistributable files shipped with the tools.
#[derive(Debug, Clone)]
pub struct Redists {
    dir: PathBuf,
}

impl Redists {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Redists { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn debug_helper(&self, machine: Machine) -> Option<PathBuf> {
        let file = match machine {
            Machine::I386 => "dbghelp-x86.dll",
            Machine::Amd64 => "dbghelp-x64.dll",
            _ => return None,
        };
        Some(self.dir.join(file))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopiedFile {
    pub name: LibraryName,
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub copied: Vec<CopiedFile>,
    pub skipped: Vec<LibraryName>,
    pub errors: Vec<CopyError>,
    /// Redist file the debug helper comes from, when the machine has one.
    pub debug_helper: Option<PathBuf>,
}

impl MaterializeReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Copies the bundled part of `closure` plus the debug helper into
/// `destination`. Failures are collected per file; the batch always runs to
/// the end. Running it again overwrites the same files with the same bytes.
pub fn materialize(
    closure: &DependencyClosure,
    destination: &Path,
    redists: &Redists,
) -> MaterializeReport {
    let mut report = MaterializeReport::default();

    if let Err(err) = fs::create_dir_all(destination) {
        warn!("creating {} failed: {err}", destination.display());
    }

    for (name, resolution) in closure.bundled() {
        match resolution {
            Resolution::Found(source) => {
                let file_name = source
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(name.as_str()));
                copy_file(&mut report, name.clone(), source, &destination.join(file_name));
            }
            Resolution::LocallyBuilt(_) => report.skipped.push(name.clone()),
            Resolution::Unresolved { .. } => {
                report
                    .errors
                    .push(CopyError::Unresolved { name: name.clone() });
            }
        }
    }

    match redists.debug_helper(closure.machine()) {
        Some(source) => {
            copy_file(
                &mut report,
                LibraryName::new(DEBUG_HELPER_NAME),
                &source,
                &destination.join(DEBUG_HELPER_NAME),
            );
            report.debug_helper = Some(source);
        }
        None => report.errors.push(CopyError::MissingDebugHelper {
            machine: closure.machine(),
        }),
    }

    report
}

fn copy_file(report: &mut MaterializeReport, name: LibraryName, source: &Path, destination: &Path) {
    // Copying a file onto itself would truncate it.
    if is_same_file(source, destination) {
        debug!("{} is already in place", destination.display());
        report.skipped.push(name);
        return;
    }

    match fs::copy(source, destination) {
        Ok(_) => {
            debug!("copied {} -> {}", source.display(), destination.display());
            report.copied.push(CopiedFile {
                name,
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
            });
        }
        Err(err) => {
            warn!("copying {} failed: {err}", source.display());
            report.errors.push(CopyError::Io {
                source_path: source.to_path_buf(),
                destination: destination.to_path_buf(),
                reason: err.to_string(),
            });
        }
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
