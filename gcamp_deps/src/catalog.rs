//! Classification tables for imported DLL names.
//!
//! The tables are plain data: the built-in [`Catalog::default`] covers the
//! toolchains Goblin Camp has shipped with, and a JSON file can replace it
//! when a build uses something else.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DepsError;
use crate::name::LibraryName;

const SYSTEM_DLLS: &[&str] = &[
    "kernel32.dll",
    "user32.dll",
    "gdi32.dll",
    "opengl32.dll",
    "winmm32.dll",
    "advapi32.dll",
    "ntdll.dll",
    "winmm.dll",
    "rpcrt4.dll",
    "secur32.dll",
    "dbghelp.dll",
    "shell32.dll",
    "shlwapi.dll",
    "kernelbase.dll",
];

const RUNTIME_DLLS: &[(&str, bool, &[&str])] = &[
    ("60", false, &["msvcrt.dll"]),
    ("2008", false, &["msvcp90.dll", "msvcr90.dll"]),
    ("2008", true, &["msvcp90d.dll", "msvcr90d.dll"]),
    ("2010", false, &["msvcp100.dll", "msvcr100.dll"]),
    ("2010", true, &["msvcp100d.dll", "msvcr100d.dll"]),
];

/// One release of the Visual C++ runtime, release or debug build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuntimeVariant {
    pub version: String,
    #[serde(default)]
    pub debug: bool,
}

impl RuntimeVariant {
    pub fn new(version: impl Into<String>, debug: bool) -> Self {
        RuntimeVariant {
            version: version.into(),
            debug,
        }
    }
}

impl fmt::Display for RuntimeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CRT_{}", self.version)?;
        if self.debug {
            f.write_str("_DBG")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Provided by Windows; never shipped.
    System,
    /// Part of a compiler runtime; covered by its redistributable.
    RuntimeVariant(RuntimeVariant),
    /// Has to be shipped next to the executable.
    Bundled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeFamily {
    #[serde(flatten)]
    pub variant: RuntimeVariant,
    pub files: BTreeSet<LibraryName>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    system: HashSet<LibraryName>,
    runtimes: Vec<RuntimeFamily>,
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::new(
            SYSTEM_DLLS.iter().copied().map(LibraryName::from),
            RUNTIME_DLLS
                .iter()
                .map(|(version, debug, files)| RuntimeFamily {
                    variant: RuntimeVariant::new(*version, *debug),
                    files: files.iter().copied().map(LibraryName::from).collect(),
                }),
        )
    }
}

impl Catalog {
    pub fn new(
        system: impl IntoIterator<Item = LibraryName>,
        runtimes: impl IntoIterator<Item = RuntimeFamily>,
    ) -> Self {
        Catalog {
            system: system.into_iter().collect(),
            runtimes: runtimes.into_iter().collect(),
        }
    }

    /// Loads a catalog from `path`, or the built-in one when no path is given.
    pub fn from_json_file(path: Option<&Path>) -> Result<Self, DepsError> {
        let Some(path) = path else {
            return Ok(Catalog::default());
        };

        let raw = fs::read_to_string(path).map_err(|err| DepsError::Catalog {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|err| DepsError::Catalog {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    pub fn classify(&self, name: &LibraryName) -> Classification {
        if self.system.contains(name) {
            return Classification::System;
        }

        self.runtimes
            .iter()
            .find(|family| family.files.contains(name))
            .map(|family| Classification::RuntimeVariant(family.variant.clone()))
            .unwrap_or(Classification::Bundled)
    }

    pub fn runtimes(&self) -> &[RuntimeFamily] {
        &self.runtimes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_tables_cover_system_and_runtime_names() {
        let catalog = Catalog::default();
        assert_eq!(
            catalog.classify(&"KERNEL32.dll".into()),
            Classification::System
        );
        assert_eq!(
            catalog.classify(&"MSVCR100D.DLL".into()),
            Classification::RuntimeVariant(RuntimeVariant::new("2010", true))
        );
        assert_eq!(
            catalog.classify(&"msvcrt.dll".into()),
            Classification::RuntimeVariant(RuntimeVariant::new("60", false))
        );
        assert_eq!(
            catalog.classify(&"libtcod-VS.dll".into()),
            Classification::Bundled
        );
    }

    #[test]
    fn runtime_variants_display_like_the_redist_names() {
        assert_eq!(RuntimeVariant::new("2008", false).to_string(), "CRT_2008");
        assert_eq!(RuntimeVariant::new("2008", true).to_string(), "CRT_2008_DBG");
    }

    #[test]
    fn loads_catalog_from_json() {
        let file = NamedTempFile::new().unwrap();
        fs::write(
            file.path(),
            r#"{
                "system": ["kernel32.dll"],
                "runtimes": [
                    { "version": "2015", "files": ["vcruntime140.dll", "msvcp140.dll"] }
                ]
            }"#,
        )
        .unwrap();

        let catalog = Catalog::from_json_file(Some(file.path())).unwrap();
        assert_eq!(
            catalog.classify(&"VCRUNTIME140.dll".into()),
            Classification::RuntimeVariant(RuntimeVariant::new("2015", false))
        );
        assert_eq!(catalog.classify(&"user32.dll".into()), Classification::Bundled);

        let families = catalog.runtimes();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].files.len(), 2);
        assert!(!families[0].variant.debug);
    }

    #[test]
    fn missing_catalog_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Catalog::from_json_file(Some(dir.path().join("nope.json").as_path())).unwrap_err();
        assert!(matches!(err, DepsError::Catalog { .. }));
    }
}
