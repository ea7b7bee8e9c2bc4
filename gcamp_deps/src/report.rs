use std::path::PathBuf;

use gcamp_formats::Machine;
use serde::Serialize;

use crate::closure::{DependencyClosure, RejectedCandidate, Resolution};
use crate::error::CopyError;
use crate::materialize::{CopiedFile, DEBUG_HELPER_NAME, MaterializeReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    Found,
    LocallyBuilt,
    Unresolved,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyReport {
    pub name: String,
    pub status: DependencyStatus,
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedCandidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterializeSummary {
    pub copied: Vec<CopiedFile>,
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
    pub debug_helper: Option<PathBuf>,
}

impl From<&MaterializeReport> for MaterializeSummary {
    fn from(report: &MaterializeReport) -> Self {
        MaterializeSummary {
            copied: report.copied.clone(),
            skipped: report.skipped.iter().map(|name| name.to_string()).collect(),
            errors: report.errors.iter().map(|err| err.to_string()).collect(),
            debug_helper: report.debug_helper.clone(),
        }
    }
}

/// Machine-readable form of a run, written by `gather_dlls --json-report`.
#[derive(Debug, Clone, Serialize)]
pub struct ClosureReport {
    pub root: PathBuf,
    pub machine: Machine,
    pub dependencies: Vec<DependencyReport>,
    pub runtimes: Vec<String>,
    pub conflicting_runtimes: bool,
    pub redistributables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materialized: Option<MaterializeSummary>,
}

pub fn build_report(
    closure: &DependencyClosure,
    materialized: Option<&MaterializeReport>,
) -> ClosureReport {
    let dependencies = closure
        .bundled()
        .iter()
        .map(|(name, resolution)| {
            let (status, rejected) = match resolution {
                Resolution::Found(_) => (DependencyStatus::Found, Vec::new()),
                Resolution::LocallyBuilt(_) => (DependencyStatus::LocallyBuilt, Vec::new()),
                Resolution::Unresolved { rejected } => {
                    (DependencyStatus::Unresolved, rejected.clone())
                }
            };
            DependencyReport {
                name: name.to_string(),
                status,
                path: resolution.path().map(|path| path.to_path_buf()),
                rejected,
            }
        })
        .collect();

    ClosureReport {
        root: closure.root().to_path_buf(),
        machine: closure.machine(),
        dependencies,
        runtimes: closure.runtimes().iter().map(|v| v.to_string()).collect(),
        conflicting_runtimes: closure.has_conflicting_runtimes(),
        redistributables: closure.redistributables().map(|v| v.to_string()).collect(),
        materialized: materialized.map(MaterializeSummary::from),
    }
}

/// The console summary: runtime warning, then one `name -> path` line per DLL.
pub fn render_summary(
    closure: &DependencyClosure,
    materialized: Option<&MaterializeReport>,
) -> String {
    let mut lines = Vec::new();

    if closure.has_conflicting_runtimes() {
        let names: Vec<String> = closure.runtimes().iter().map(|v| v.to_string()).collect();
        lines.push(format!(
            "** Warning: multiple CRTs detected: {}",
            names.join(", ")
        ));
    }

    lines.push("** DLLs:".to_string());
    for (name, resolution) in closure.bundled() {
        let target = match resolution {
            Resolution::Found(path) => path.display().to_string(),
            Resolution::LocallyBuilt(_) => "<provided>".to_string(),
            Resolution::Unresolved { .. } => "<unresolved>".to_string(),
        };
        lines.push(format!("{name} -> {target}"));
    }

    if let Some(report) = materialized {
        if let Some(source) = &report.debug_helper {
            let failed = report.errors.iter().any(|err| {
                matches!(err, CopyError::Io { source_path, .. } if source_path == source)
            });
            let note = if failed { " (not copied)" } else { "" };
            lines.push(format!(
                "{DEBUG_HELPER_NAME} -> {}{note}",
                source.display()
            ));
        }

        if !report.errors.is_empty() {
            lines.push("** Copy errors:".to_string());
            lines.extend(report.errors.iter().map(|err| format!("  {err}")));
        }
    }

    lines.join("\n")
}
