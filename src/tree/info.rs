//! Per-resource state stored in tree nodes

use crate::description::ProjectDescription;
use crate::filter::FilterDescription;
use crate::markers::MarkerSet;
use crate::types::{NodeId, QualifiedName, ResourceKind, NULL_STAMP};
use bitflags::bitflags;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

bitflags! {
    /// Boolean resource attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InfoFlags: u32 {
        const OPEN = 1 << 0;
        const DERIVED = 1 << 1;
        const TEAM_PRIVATE = 1 << 2;
        const HIDDEN = 1 << 3;
        const VIRTUAL = 1 << 4;
        const PHANTOM = 1 << 5;
        const LINK = 1 << 6;
        const LOCAL_EXISTS = 1 << 7;
    }
}

/// Local filesystem state recorded at the last sync with disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalState {
    pub last_modified: i64,
    pub length: u64,
}

pub type SyncTable = BTreeMap<QualifiedName, Vec<u8>>;
pub type PropertyMap = BTreeMap<QualifiedName, String>;

/// State of one resource in one snapshot.
///
/// Infos are shared between snapshots behind an `Arc`; every mutation
/// goes through the tree which clones on write.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    pub kind: ResourceKind,
    pub flags: InfoFlags,
    pub node_id: NodeId,
    /// Changes whenever file content is replaced.
    pub content_id: u64,
    pub modification_stamp: i64,
    pub local: Option<LocalState>,
    pub link_target: Option<PathBuf>,
    pub filters: Vec<FilterDescription>,
    /// Explicit charset (files) or default charset (containers).
    pub charset: Option<String>,
    /// Charset sniffed from content, cached on write and refresh.
    pub detected_charset: Option<String>,
    pub sync_info: Option<Arc<SyncTable>>,
    pub markers: Option<Arc<MarkerSet>>,
    pub persistent_properties: Option<Arc<PropertyMap>>,
    pub session_properties: Option<Arc<PropertyMap>>,
    pub description: Option<Arc<ProjectDescription>>,
}

impl ResourceInfo {
    pub fn new(kind: ResourceKind, node_id: NodeId) -> Self {
        Self {
            kind,
            flags: InfoFlags::empty(),
            node_id,
            content_id: 0,
            modification_stamp: 0,
            local: None,
            link_target: None,
            filters: Vec::new(),
            charset: None,
            detected_charset: None,
            sync_info: None,
            markers: None,
            persistent_properties: None,
            session_properties: None,
            description: None,
        }
    }

    pub fn is_phantom(&self) -> bool {
        self.flags.contains(InfoFlags::PHANTOM)
    }

    pub fn is_open(&self) -> bool {
        self.flags.contains(InfoFlags::OPEN)
    }

    pub fn is_link(&self) -> bool {
        self.flags.contains(InfoFlags::LINK)
    }

    pub fn is_virtual(&self) -> bool {
        self.flags.contains(InfoFlags::VIRTUAL)
    }

    pub fn local_exists(&self) -> bool {
        self.flags.contains(InfoFlags::LOCAL_EXISTS)
    }

    pub fn is_derived(&self) -> bool {
        self.flags.contains(InfoFlags::DERIVED)
    }

    pub fn is_team_private(&self) -> bool {
        self.flags.contains(InfoFlags::TEAM_PRIVATE)
    }

    pub fn is_hidden(&self) -> bool {
        self.flags.contains(InfoFlags::HIDDEN)
    }

    /// Whether the children of this node are part of the visible namespace.
    pub fn exposes_children(&self) -> bool {
        match self.kind {
            ResourceKind::File => false,
            ResourceKind::Project => self.is_open(),
            _ => true,
        }
    }

    pub fn has_sync_info(&self) -> bool {
        self.sync_info.as_ref().map_or(false, |t| !t.is_empty())
    }

    pub fn has_markers(&self) -> bool {
        self.markers.as_ref().map_or(false, |m| !m.is_empty())
    }

    /// Markers that are visible to clients; phantoms hide theirs.
    pub fn visible_markers(&self) -> Option<&MarkerSet> {
        if self.is_phantom() {
            None
        } else {
            self.markers.as_deref()
        }
    }

    /// A deleted resource stays as a phantom while it carries sync info or markers.
    pub fn retains_phantom(&self) -> bool {
        self.kind != ResourceKind::Project && (self.has_sync_info() || self.has_markers())
    }

    /// Phantom form of this info, carrying only sync info and markers.
    pub fn to_phantom(&self, node_id: NodeId) -> ResourceInfo {
        let mut phantom = ResourceInfo::new(self.kind, node_id);
        phantom.flags = InfoFlags::PHANTOM;
        phantom.modification_stamp = NULL_STAMP;
        phantom.sync_info = self.sync_info.clone();
        phantom.markers = self.markers.clone();
        phantom
    }

    /// Stamp reported to clients.
    pub fn stamp(&self) -> i64 {
        if self.is_phantom() {
            NULL_STAMP
        } else {
            self.modification_stamp
        }
    }
}
