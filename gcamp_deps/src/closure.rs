use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use gcamp_formats::Machine;
use serde::Serialize;

use crate::catalog::RuntimeVariant;
use crate::name::LibraryName;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    ArchitectureMismatch(Machine),
    Unparseable(String),
}

/// A file that had the right name but could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedCandidate {
    pub path: PathBuf,
    pub reason: RejectReason,
}

/// Where a bundled dependency was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Found on the search path; has to be copied next to the executable.
    Found(PathBuf),
    /// Already sits next to the root image (built alongside it).
    LocallyBuilt(PathBuf),
    /// Nowhere to be found. Candidates that were skipped are kept for the report.
    Unresolved { rejected: Vec<RejectedCandidate> },
}

impl Resolution {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Resolution::Found(path) | Resolution::LocallyBuilt(path) => Some(path),
            Resolution::Unresolved { .. } => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Resolution::Unresolved { .. })
    }
}

/// Everything a root image needs at load time, minus what Windows provides.
#[derive(Debug, Clone)]
pub struct DependencyClosure {
    pub(crate) root: PathBuf,
    pub(crate) machine: Machine,
    pub(crate) bundled: BTreeMap<LibraryName, Resolution>,
    pub(crate) runtimes: BTreeSet<RuntimeVariant>,
}

impl DependencyClosure {
    pub(crate) fn new(root: PathBuf, machine: Machine) -> Self {
        DependencyClosure {
            root,
            machine,
            bundled: BTreeMap::new(),
            runtimes: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn machine(&self) -> Machine {
        self.machine
    }

    pub fn bundled(&self) -> &BTreeMap<LibraryName, Resolution> {
        &self.bundled
    }

    pub fn get(&self, name: &str) -> Option<&Resolution> {
        self.bundled.get(&LibraryName::new(name))
    }

    pub fn runtimes(&self) -> &BTreeSet<RuntimeVariant> {
        &self.runtimes
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &LibraryName> {
        self.bundled
            .iter()
            .filter(|(_, resolution)| resolution.is_unresolved())
            .map(|(name, _)| name)
    }

    /// Release runtimes the installer has to ship a redistributable for.
    pub fn redistributables(&self) -> impl Iterator<Item = &RuntimeVariant> {
        self.runtimes.iter().filter(|variant| !variant.debug)
    }

    pub fn has_conflicting_runtimes(&self) -> bool {
        has_conflicting_runtimes(self)
    }
}

/// More than one runtime flavour in one process is asking for heap and
/// locale state to be split between them.
pub fn has_conflicting_runtimes(closure: &DependencyClosure) -> bool {
    closure.runtimes.len() > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closure_with(runtimes: &[RuntimeVariant]) -> DependencyClosure {
        let mut closure = DependencyClosure::new(PathBuf::from("gc.exe"), Machine::I386);
        closure.runtimes.extend(runtimes.iter().cloned());
        closure
    }

    #[test]
    fn conflicts_need_two_distinct_variants() {
        assert!(!closure_with(&[]).has_conflicting_runtimes());
        assert!(!closure_with(&[RuntimeVariant::new("2010", false)]).has_conflicting_runtimes());
        assert!(has_conflicting_runtimes(&closure_with(&[
            RuntimeVariant::new("2010", false),
            RuntimeVariant::new("2010", true),
        ])));
        assert!(has_conflicting_runtimes(&closure_with(&[
            RuntimeVariant::new("2008", false),
            RuntimeVariant::new("2010", false),
        ])));
    }

    #[test]
    fn redistributables_skip_debug_runtimes() {
        let closure = closure_with(&[
            RuntimeVariant::new("2010", false),
            RuntimeVariant::new("2010", true),
        ]);
        let redists: Vec<_> = closure.redistributables().collect();
        assert_eq!(redists, vec![&RuntimeVariant::new("2010", false)]);
    }
}
