#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use gcamp_deps::SearchPath;
use gcamp_formats::Machine;
use gcamp_formats::fixtures::write_image;
use tempfile::{TempDir, tempdir};

/// Scratch tree: `app/` holds the executable, `sys/` and `sys2/` are on the search path.
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempdir().expect("creating sandbox");
        for sub in ["app", "sys", "sys2", "redists"] {
            fs::create_dir_all(dir.path().join(sub)).expect("creating sandbox dir");
        }
        Sandbox { dir }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn app(&self) -> PathBuf {
        self.path("app")
    }

    pub fn sys(&self) -> PathBuf {
        self.path("sys")
    }

    pub fn sys2(&self) -> PathBuf {
        self.path("sys2")
    }

    pub fn search_path(&self) -> SearchPath {
        SearchPath::new([self.sys(), self.sys2()])
    }

    /// Writes `app/goblin-camp.exe` and returns its path.
    pub fn root(&self, machine: Machine, imports: &[&str]) -> PathBuf {
        let path = self.app().join("goblin-camp.exe");
        write_image(&path, machine, imports).expect("writing root image");
        path
    }

    pub fn dll(&self, dir: &Path, name: &str, machine: Machine, imports: &[&str]) -> PathBuf {
        let path = dir.join(name);
        write_image(&path, machine, imports).expect("writing dll");
        path
    }

    pub fn redists(&self) -> PathBuf {
        let dir = self.path("redists");
        fs::write(dir.join("dbghelp-x86.dll"), b"dbghelp x86").expect("writing redist");
        fs::write(dir.join("dbghelp-x64.dll"), b"dbghelp x64").expect("writing redist");
        dir
    }
}
