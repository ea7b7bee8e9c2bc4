//! Collects the third-party headers (Boost, in practice) that Goblin Camp's
//! sources reach through `#include`, so they can be vendored into the tree.

pub mod bundle;
pub mod graph;
pub mod sources;

pub use bundle::bundle;
pub use graph::{HeaderClosure, HeaderScanner};
pub use sources::{DEFAULT_MARKER, collect_sources, locate_library_root};
