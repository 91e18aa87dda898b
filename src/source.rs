//! Normalized source locations.

use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::runtime::RuntimeFacade;

/// A source file as the core sees it.
///
/// The path is resolved to its canonical absolute form when the `Source` is
/// created, so that values observed from runtime code objects compare equal
/// to values built from client requests. Synthetic tokens that are not file
/// paths (such as `<stdin>` or `<string>`) pass through verbatim. Two
/// sources with the same resolved path are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    path: String,
}

impl Source {
    /// Resolve a raw path through the runtime's normalization rules.
    pub fn resolve(runtime: &dyn RuntimeFacade, raw: &str) -> Self {
        Source {
            path: runtime.normalize_source_path(raw),
        }
    }

    /// Build a source from an already resolved path.
    pub fn from_resolved(path: impl Into<String>) -> Self {
        Source { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this is a synthetic token rather than a file path.
    pub fn is_synthetic(&self) -> bool {
        self.path.starts_with('<')
    }

    /// The short name shown in the UI: the final path component, or the
    /// whole token for synthetic sources.
    pub fn name(&self) -> &str {
        if self.is_synthetic() {
            return &self.path;
        }
        self.path
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .unwrap_or(&self.path)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl Serialize for Source {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Source", 2)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("path", &self.path)?;
        state.end()
    }
}
