use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A DLL name as it appears in an import table. Windows treats these
/// case-insensitively, so comparison and hashing go through the folded form
/// while the original spelling is kept for display.
#[derive(Debug, Clone)]
pub struct LibraryName {
    original: String,
    folded: String,
}

impl LibraryName {
    pub fn new(name: impl Into<String>) -> Self {
        let original = name.into();
        let folded = original.to_ascii_lowercase();
        LibraryName { original, folded }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn folded(&self) -> &str {
        &self.folded
    }
}

impl From<&str> for LibraryName {
    fn from(value: &str) -> Self {
        LibraryName::new(value)
    }
}

impl From<String> for LibraryName {
    fn from(value: String) -> Self {
        LibraryName::new(value)
    }
}

impl PartialEq for LibraryName {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for LibraryName {}

impl Hash for LibraryName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl PartialOrd for LibraryName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LibraryName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded.cmp(&other.folded)
    }
}

impl fmt::Display for LibraryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl Serialize for LibraryName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.original)
    }
}

impl<'de> Deserialize<'de> for LibraryName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(LibraryName::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_ignores_case_but_display_keeps_it() {
        let upper = LibraryName::new("SDL.DLL");
        let lower = LibraryName::new("sdl.dll");
        assert_eq!(upper, lower);
        assert_eq!(upper.to_string(), "SDL.DLL");

        let mut set = HashSet::new();
        set.insert(upper);
        assert!(!set.insert(lower));
    }
}
