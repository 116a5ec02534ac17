//! Shared identifier and value types used across the workspace engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Modification stamp reported for resources that do not exist locally.
pub const NULL_STAMP: i64 = -1;

/// Stable identity of a resource node.
///
/// A node keeps its identity when it is moved, which is how the delta
/// engine pairs a removal with an addition into a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Marker identifier, unique within a workspace.
pub type MarkerId = u64;

/// The four resource variants of the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Root,
    Project,
    Folder,
    File,
}

impl ResourceKind {
    pub fn is_container(self) -> bool {
        !matches!(self, ResourceKind::File)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Root => "root",
            ResourceKind::Project => "project",
            ResourceKind::Folder => "folder",
            ResourceKind::File => "file",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traversal depth for deep operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Depth {
    Zero,
    One,
    Infinite,
}

impl Depth {
    /// Depth to use one level further down.
    pub fn below(self) -> Option<Depth> {
        match self {
            Depth::Zero => None,
            Depth::One => Some(Depth::Zero),
            Depth::Infinite => Some(Depth::Infinite),
        }
    }
}

/// Two-part name used for sync partners and properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub qualifier: String,
    pub local: String,
}

impl QualifiedName {
    pub fn new(qualifier: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into(),
            local: local.into(),
        }
    }

    /// Parse `qualifier:local`. A name without a colon has an empty qualifier.
    pub fn parse(s: &str) -> Self {
        match s.split_once(':') {
            Some((q, l)) => Self::new(q, l),
            None => Self::new("", s),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.qualifier.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{}:{}", self.qualifier, self.local)
        }
    }
}
