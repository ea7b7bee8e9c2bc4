use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use gcamp_formats::Image;
use log::{debug, warn};

use crate::catalog::{Catalog, Classification};
use crate::closure::{DependencyClosure, RejectReason, RejectedCandidate, Resolution};
use crate::error::DepsError;
use crate::name::LibraryName;
use crate::search::{SearchPath, find_in_dir};

/// Walks the import graph of `root` and sorts every reachable DLL into
/// system, runtime, or bundled. Only a broken root image is an error;
/// anything that goes wrong further down ends up in the closure.
pub fn classify(
    root: &Path,
    catalog: &Catalog,
    search_path: &SearchPath,
) -> Result<DependencyClosure, DepsError> {
    let image = Image::open(root).map_err(|err| DepsError::ImageParse {
        path: root.to_path_buf(),
        reason: format!("{err:#}"),
    })?;
    debug!(
        "root image {} targets {} and imports {} libraries",
        root.display(),
        image.machine(),
        image.imports().len()
    );

    let mut traversal = Traversal {
        catalog,
        search_path,
        root_dir: root_directory(root),
        visited: HashSet::new(),
        pending: Vec::new(),
        closure: DependencyClosure::new(root.to_path_buf(), image.machine()),
    };
    traversal.enqueue_imports(&image);
    traversal.run();

    Ok(traversal.closure)
}

/// State for a single `classify` call.
struct Traversal<'a> {
    catalog: &'a Catalog,
    search_path: &'a SearchPath,
    root_dir: PathBuf,
    visited: HashSet<LibraryName>,
    // Depth-first work stack; imports are pushed in reverse so they pop in table order.
    pending: Vec<LibraryName>,
    closure: DependencyClosure,
}

impl Traversal<'_> {
    fn enqueue_imports(&mut self, image: &Image) {
        self.pending.extend(
            image
                .imports()
                .iter()
                .rev()
                .map(|library| LibraryName::new(library.name.as_str())),
        );
    }

    fn run(&mut self) {
        while let Some(name) = self.pending.pop() {
            if !self.visited.insert(name.clone()) {
                continue;
            }

            match self.catalog.classify(&name) {
                Classification::System => {}
                Classification::RuntimeVariant(variant) => {
                    debug!("{name} belongs to {variant}");
                    self.closure.runtimes.insert(variant);
                }
                Classification::Bundled => {
                    let (resolution, image) = self.resolve(&name);
                    self.closure.bundled.insert(name, resolution);
                    if let Some(image) = image {
                        self.enqueue_imports(&image);
                    }
                }
            }
        }
    }

    fn resolve(&self, name: &LibraryName) -> (Resolution, Option<Image>) {
        let mut rejected = Vec::new();

        for candidate in self.search_path.candidates(name) {
            match self.load_matching(&candidate) {
                Ok(image) => {
                    debug!("{name} -> {}", candidate.display());
                    return (Resolution::Found(candidate), Some(image));
                }
                Err(reason) => {
                    warn!("skipping {}: {reason:?}", candidate.display());
                    rejected.push(RejectedCandidate {
                        path: candidate,
                        reason,
                    });
                }
            }
        }

        if let Some(local) = find_in_dir(&self.root_dir, name) {
            match self.load_matching(&local) {
                Ok(image) => {
                    debug!("{name} was built alongside the root image");
                    return (Resolution::LocallyBuilt(local), Some(image));
                }
                Err(reason) => {
                    warn!("skipping {}: {reason:?}", local.display());
                    rejected.push(RejectedCandidate {
                        path: local,
                        reason,
                    });
                }
            }
        }

        warn!("{name} could not be resolved");
        (Resolution::Unresolved { rejected }, None)
    }

    fn load_matching(&self, path: &Path) -> Result<Image, RejectReason> {
        let image = Image::open(path).map_err(|err| RejectReason::Unparseable(format!("{err:#}")))?;
        if image.machine() != self.closure.machine {
            return Err(RejectReason::ArchitectureMismatch(image.machine()));
        }
        Ok(image)
    }
}

fn root_directory(root: &Path) -> PathBuf {
    fs::canonicalize(root)
        .ok()
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .or_else(|| root.parent().map(Path::to_path_buf))
        .unwrap_or_default()
}
