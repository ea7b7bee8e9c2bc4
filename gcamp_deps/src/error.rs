use std::path::PathBuf;

use gcamp_formats::Machine;
use thiserror::Error;

use crate::name::LibraryName;

/// Failures that stop a run outright.
#[derive(Debug, Error)]
pub enum DepsError {
    /// The root image is missing or is not a PE file we can read.
    #[error("cannot read root image {path}: {reason}")]
    ImageParse { path: PathBuf, reason: String },

    /// A catalog file could not be read or parsed.
    #[error("cannot load catalog {path}: {reason}")]
    Catalog { path: PathBuf, reason: String },
}

/// A single failed copy during materialization. These are collected, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CopyError {
    #[error("{name} was not found on the search path")]
    Unresolved { name: LibraryName },

    #[error("no debug helper is bundled for {machine}")]
    MissingDebugHelper { machine: Machine },

    #[error("copying {} to {} failed: {reason}", source_path.display(), destination.display())]
    Io {
        source_path: PathBuf,
        destination: PathBuf,
        reason: String,
    },
}
