use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Immutable name of a facet's role inside a world (e.g. `"environment"`).
///
/// Cloning is a reference-count bump. The empty identifier is the
/// "no constraint" value returned by facets that declare no ordering.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacetId(Arc<str>);

impl FacetId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The "no constraint" identifier.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::from(""))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Maps the empty identifier to `None`.
    #[must_use]
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl Default for FacetId {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for FacetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FacetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FacetId({:?})", &*self.0)
    }
}

impl From<&str> for FacetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FacetId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl AsRef<str> for FacetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for FacetId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for FacetId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for FacetId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// Well-known facet identifiers.
///
/// These names form a small stable protocol: the world keeps a direct slot for
/// each of them, and other facets may order themselves relative to them.
pub mod reserved {
    use super::FacetId;

    pub const DATA_MANAGER: &str = "datamanager";
    pub const ENVIRONMENT: &str = "environment";
    pub const OUTPUT_MANAGER: &str = "outputmanager";
    pub const SYSTEMATICS: &str = "systematics";

    pub const ALL: [&str; 4] = [DATA_MANAGER, ENVIRONMENT, OUTPUT_MANAGER, SYSTEMATICS];

    #[must_use]
    pub fn data_manager() -> FacetId {
        FacetId::new(DATA_MANAGER)
    }

    #[must_use]
    pub fn environment() -> FacetId {
        FacetId::new(ENVIRONMENT)
    }

    #[must_use]
    pub fn output_manager() -> FacetId {
        FacetId::new(OUTPUT_MANAGER)
    }

    #[must_use]
    pub fn systematics() -> FacetId {
        FacetId::new(SYSTEMATICS)
    }

    #[must_use]
    pub fn is_reserved(id: &str) -> bool {
        ALL.contains(&id)
    }
}
