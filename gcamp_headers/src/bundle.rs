use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

use crate::graph::HeaderClosure;

/// Copies every header in `closure` into `output_dir`, keeping its path
/// relative to the library root. Returns the written paths.
pub fn bundle(closure: &HeaderClosure, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(closure.headers().len());

    for relative in closure.relative_headers() {
        let source = closure.library_root().join(relative);
        let dest = output_dir.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::copy(&source, &dest)
            .with_context(|| format!("copying {} to {}", source.display(), dest.display()))?;
        debug!("copied {}", relative.display());
        written.push(dest);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::HeaderScanner;
    use tempfile::tempdir;

    #[test]
    fn copies_headers_under_their_library_paths() {
        let dir = tempdir().unwrap();
        let lib = dir.path().join("include");
        fs::create_dir_all(lib.join("boost/detail")).unwrap();
        fs::write(lib.join("boost/a.hpp"), "#include <boost/detail/b.hpp>\n").unwrap();
        fs::write(lib.join("boost/detail/b.hpp"), "b").unwrap();
        fs::write(dir.path().join("main.cpp"), "#include <boost/a.hpp>\n").unwrap();

        let closure = HeaderScanner::new(&lib)
            .unwrap()
            .scan(vec![dir.path().join("main.cpp")]);
        let out = dir.path().join("vendor");
        let written = bundle(&closure, &out).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(fs::read_to_string(out.join("boost/detail/b.hpp")).unwrap(), "b");
        assert!(out.join("boost/a.hpp").is_file());
    }
}
