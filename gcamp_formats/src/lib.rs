pub mod pe;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;

pub use pe::{Image, ImportSymbol, ImportedLibrary, Machine, PeFormat};
