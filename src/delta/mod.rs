//! Resource deltas
//!
//! A delta is a tree of changes between two snapshots, rooted at the
//! workspace root and containing only changed nodes and their ancestors.

pub mod diff;
pub mod merge;

pub use diff::{compute_delta, DiffContext};
pub use merge::merge;

use crate::markers::MarkerDelta;
use crate::resource::Resource;
use crate::tree::path::ResourcePath;
use crate::types::{NodeId, ResourceKind};
use bitflags::bitflags;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    NoChange,
    Added,
    Removed,
    Changed,
    AddedPhantom,
    RemovedPhantom,
}

impl DeltaKind {
    fn mask(self) -> KindMask {
        match self {
            DeltaKind::NoChange => KindMask::empty(),
            DeltaKind::Added => KindMask::ADDED,
            DeltaKind::Removed => KindMask::REMOVED,
            DeltaKind::Changed => KindMask::CHANGED,
            DeltaKind::AddedPhantom => KindMask::ADDED_PHANTOM,
            DeltaKind::RemovedPhantom => KindMask::REMOVED_PHANTOM,
        }
    }

    fn symbol(self) -> char {
        match self {
            DeltaKind::NoChange => ' ',
            DeltaKind::Added => '+',
            DeltaKind::Removed => '-',
            DeltaKind::Changed => '*',
            DeltaKind::AddedPhantom => '>',
            DeltaKind::RemovedPhantom => '<',
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeltaFlags: u32 {
        const CONTENT = 1 << 0;
        const MOVED_FROM = 1 << 1;
        const MOVED_TO = 1 << 2;
        const OPEN = 1 << 3;
        const TYPE = 1 << 4;
        const SYNC = 1 << 5;
        const MARKERS = 1 << 6;
        const REPLACED = 1 << 7;
        const DESCRIPTION = 1 << 8;
        const ENCODING = 1 << 9;
        const LOCAL_CHANGED = 1 << 10;
        const DERIVED_CHANGED = 1 << 11;
    }
}

bitflags! {
    /// Selects delta kinds in [`ResourceDelta::affected_children`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KindMask: u32 {
        const ADDED = 1 << 0;
        const REMOVED = 1 << 1;
        const CHANGED = 1 << 2;
        const ADDED_PHANTOM = 1 << 3;
        const REMOVED_PHANTOM = 1 << 4;
        const ALL = Self::ADDED.bits() | Self::REMOVED.bits() | Self::CHANGED.bits();
        const ALL_WITH_PHANTOMS = Self::ALL.bits()
            | Self::ADDED_PHANTOM.bits()
            | Self::REMOVED_PHANTOM.bits();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDelta {
    pub(crate) path: ResourcePath,
    pub(crate) resource_kind: ResourceKind,
    pub(crate) kind: DeltaKind,
    pub(crate) flags: DeltaFlags,
    /// Both sides of the change are phantoms.
    pub(crate) phantom: bool,
    pub(crate) moved_from: Option<ResourcePath>,
    pub(crate) moved_to: Option<ResourcePath>,
    pub(crate) marker_deltas: Vec<MarkerDelta>,
    /// Sorted by name.
    pub(crate) children: Vec<ResourceDelta>,
    pub(crate) old_node: Option<NodeId>,
    pub(crate) new_node: Option<NodeId>,
}

impl ResourceDelta {
    pub(crate) fn new(path: ResourcePath, resource_kind: ResourceKind, kind: DeltaKind) -> Self {
        Self {
            path,
            resource_kind,
            kind,
            flags: DeltaFlags::empty(),
            phantom: false,
            moved_from: None,
            moved_to: None,
            marker_deltas: Vec::new(),
            children: Vec::new(),
            old_node: None,
            new_node: None,
        }
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn resource_kind(&self) -> ResourceKind {
        self.resource_kind
    }

    pub fn resource(&self) -> Resource {
        Resource::from_kind(self.path.clone(), self.resource_kind)
    }

    pub fn kind(&self) -> DeltaKind {
        self.kind
    }

    pub fn flags(&self) -> DeltaFlags {
        self.flags
    }

    pub fn is_phantom(&self) -> bool {
        self.phantom || matches!(self.kind, DeltaKind::AddedPhantom | DeltaKind::RemovedPhantom)
    }

    pub fn moved_from_path(&self) -> Option<&ResourcePath> {
        self.moved_from.as_ref()
    }

    pub fn moved_to_path(&self) -> Option<&ResourcePath> {
        self.moved_to.as_ref()
    }

    pub fn marker_deltas(&self) -> &[MarkerDelta] {
        &self.marker_deltas
    }

    /// Changed children, excluding phantoms.
    pub fn affected_children(&self, mask: KindMask) -> Vec<&ResourceDelta> {
        self.children
            .iter()
            .filter(|c| mask.intersects(c.kind.mask()))
            .filter(|c| !c.phantom || mask.intersects(KindMask::ADDED_PHANTOM | KindMask::REMOVED_PHANTOM))
            .collect()
    }

    /// Delta node for `path`, if it lies in this delta.
    pub fn find_member(&self, path: &ResourcePath) -> Option<&ResourceDelta> {
        let rest = path.strip_prefix(&self.path)?;
        let mut current = self;
        for name in rest {
            current = current.child(name)?;
        }
        Some(current)
    }

    pub(crate) fn find_member_mut(&mut self, path: &ResourcePath) -> Option<&mut ResourceDelta> {
        let rest: Vec<String> = path.strip_prefix(&self.path)?.to_vec();
        let mut current = self;
        for name in &rest {
            let index = current
                .children
                .binary_search_by(|c| c.name().cmp(name.as_str()))
                .ok()?;
            current = &mut current.children[index];
        }
        Some(current)
    }

    fn child(&self, name: &str) -> Option<&ResourceDelta> {
        self.children
            .binary_search_by(|c| c.name().cmp(name))
            .ok()
            .map(|i| &self.children[i])
    }

    pub(crate) fn name(&self) -> &str {
        self.path.last_segment().unwrap_or("")
    }

    /// Pre-order visit. The visitor returns whether to descend.
    pub fn accept<F>(&self, include_phantoms: bool, visitor: &mut F)
    where
        F: FnMut(&ResourceDelta) -> bool,
    {
        if self.is_phantom() && !include_phantoms {
            return;
        }
        if !visitor(self) {
            return;
        }
        for child in &self.children {
            child.accept(include_phantoms, visitor);
        }
    }

    /// Number of nodes in this delta tree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// True when nothing below the root reports a change.
    pub(crate) fn is_empty_change(&self) -> bool {
        self.kind == DeltaKind::NoChange
            && self.flags.is_empty()
            && self.marker_deltas.is_empty()
            && self.children.is_empty()
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "{:indent$}{}{}", "", self.kind.symbol(), self.path, indent = indent)?;
        if !self.flags.is_empty() {
            write!(f, " {:?}", self.flags)?;
        }
        if let Some(from) = &self.moved_from {
            write!(f, " from {}", from)?;
        }
        if let Some(to) = &self.moved_to {
            write!(f, " to {}", to)?;
        }
        if !self.marker_deltas.is_empty() {
            write!(f, " ({} marker changes)", self.marker_deltas.len())?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.write_tree(f, indent + 2)?;
        }
        Ok(())
    }
}

impl fmt::Display for ResourceDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}
