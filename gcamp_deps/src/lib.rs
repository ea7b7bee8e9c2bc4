//! Finds the DLLs a Windows build of Goblin Camp needs at load time and
//! gathers the ones that have to ship with it.

pub mod catalog;
pub mod classify;
pub mod closure;
pub mod error;
pub mod materialize;
pub mod name;
pub mod report;
pub mod search;

pub use catalog::{Catalog, Classification, RuntimeFamily, RuntimeVariant};
pub use classify::classify;
pub use closure::{
    DependencyClosure, RejectReason, RejectedCandidate, Resolution, has_conflicting_runtimes,
};
pub use error::{CopyError, DepsError};
pub use materialize::{DEBUG_HELPER_NAME, MaterializeReport, Redists, materialize};
pub use name::LibraryName;
pub use report::{ClosureReport, build_report, render_summary};
pub use search::SearchPath;
