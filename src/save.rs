//! Workspace save and restore
//!
//! Markers, sync info (including phantoms) and persistent properties are
//! written as a flat record stream in depth-first order. Restoring the
//! stream into a freshly opened workspace reattaches every record whose
//! resource still exists, recreates phantoms for sync info, and skips
//! the rest.

use crate::error::ResourceError;
use crate::markers::{MarkerAttributes, MarkerInfo, MarkerSet};
use crate::monitor::NullMonitor;
use crate::rules::SchedulingRule;
use crate::store::SaveStore;
use crate::tree::element::Visit;
use crate::tree::info::{InfoFlags, PropertyMap, ResourceInfo, SyncTable};
use crate::tree::path::ResourcePath;
use crate::types::{MarkerId, QualifiedName, ResourceKind, NULL_STAMP};
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SaveRecord {
    Marker {
        path: ResourcePath,
        id: MarkerId,
        marker_type: String,
        creation_time: i64,
        attributes: MarkerAttributes,
    },
    SyncInfo {
        path: ResourcePath,
        partner: QualifiedName,
        bytes: Vec<u8>,
        /// The resource was a phantom when saved.
        phantom: bool,
        kind: ResourceKind,
    },
    Property {
        path: ResourcePath,
        name: QualifiedName,
        value: String,
    },
}

impl SaveRecord {
    pub fn path(&self) -> &ResourcePath {
        match self {
            SaveRecord::Marker { path, .. }
            | SaveRecord::SyncInfo { path, .. }
            | SaveRecord::Property { path, .. } => path,
        }
    }
}

impl Workspace {
    /// Snapshot of everything that survives a restart, depth-first.
    /// Transient markers are left out.
    pub fn save_records(&self) -> Vec<SaveRecord> {
        let tree = self.tree.read();
        let mut records = Vec::new();
        let walked = tree.walk(&ResourcePath::root(), |path, info| {
            if let Some(properties) = &info.persistent_properties {
                for (name, value) in properties.iter() {
                    records.push(SaveRecord::Property {
                        path: path.clone(),
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
            }
            if let Some(markers) = &info.markers {
                for marker in markers.iter().filter(|m| !m.is_transient()) {
                    records.push(SaveRecord::Marker {
                        path: path.clone(),
                        id: marker.id,
                        marker_type: marker.marker_type.clone(),
                        creation_time: marker.creation_time,
                        attributes: marker.attributes.clone(),
                    });
                }
            }
            if let Some(table) = &info.sync_info {
                for (partner, bytes) in table.iter() {
                    records.push(SaveRecord::SyncInfo {
                        path: path.clone(),
                        partner: partner.clone(),
                        bytes: bytes.clone(),
                        phantom: info.is_phantom(),
                        kind: info.kind,
                    });
                }
            }
            Ok(Visit::Continue)
        });
        if let Err(err) = walked {
            warn!(error = %err, "Save walk stopped early");
        }
        records
    }

    /// Reattach saved records to the current tree in one operation.
    ///
    /// Returns the number of records applied. Partners found in the
    /// stream are registered.
    pub fn restore_records(&self, records: &[SaveRecord]) -> Result<usize, ResourceError> {
        self.run(SchedulingRule::Workspace, false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&ResourcePath::root())?;
            let mut applied = 0;
            let mut max_marker = 0;
            for record in records {
                let path = record.path();
                match record {
                    SaveRecord::Marker {
                        id,
                        marker_type,
                        creation_time,
                        attributes,
                        ..
                    } => {
                        let live = tree.visible_info(path).map_or(false, |i| !i.is_phantom());
                        if !live || path.is_root() {
                            debug!(path = %path, id, "Skipping marker for missing resource");
                            continue;
                        }
                        let marker = MarkerInfo {
                            id: *id,
                            marker_type: marker_type.clone(),
                            attributes: attributes.clone(),
                            creation_time: *creation_time,
                        };
                        tree.update(path, |info| {
                            let mut set = info.markers.as_deref().cloned().unwrap_or_else(MarkerSet::default);
                            set.insert(marker);
                            info.markers = Some(Arc::new(set));
                        })?;
                        max_marker = max_marker.max(*id);
                    }
                    SaveRecord::SyncInfo {
                        partner, bytes, kind, ..
                    } => {
                        if path.segment_count() < 2 && *kind != ResourceKind::Project {
                            continue;
                        }
                        ws.sync_partners.write().insert(partner.clone());
                        if tree.info(path).is_none() {
                            if !ws.create_phantom_chain(&mut tree, path, *kind)? {
                                debug!(path = %path, "Skipping sync info outside an existing project");
                                continue;
                            }
                        }
                        tree.update(path, |info| {
                            let mut table = info.sync_info.as_deref().cloned().unwrap_or_else(SyncTable::new);
                            table.insert(partner.clone(), bytes.clone());
                            info.sync_info = Some(Arc::new(table));
                        })?;
                    }
                    SaveRecord::Property { name, value, .. } => {
                        if tree.info(path).map_or(true, |i| i.is_phantom()) {
                            continue;
                        }
                        tree.update(path, |info| {
                            let mut map = info
                                .persistent_properties
                                .as_deref()
                                .cloned()
                                .unwrap_or_else(PropertyMap::new);
                            map.insert(name.clone(), value.clone());
                            info.persistent_properties = Some(Arc::new(map));
                        })?;
                    }
                }
                applied += 1;
            }
            ws.next_marker.fetch_max(max_marker + 1, Ordering::SeqCst);
            Ok(applied)
        })
    }

    /// Write the record stream to `store`. Returns the record count.
    pub fn save(&self, store: &dyn SaveStore) -> Result<usize, ResourceError> {
        let records = self.save_records();
        store.save(&records)?;
        info!(records = records.len(), "Workspace state saved");
        Ok(records.len())
    }

    pub fn restore(&self, store: &dyn SaveStore) -> Result<usize, ResourceError> {
        let records = store.load()?;
        let applied = self.restore_records(&records)?;
        info!(records = records.len(), applied, "Workspace state restored");
        Ok(applied)
    }

    /// Create phantom nodes down to `path`. The project must exist; it
    /// is never created. Returns false when it does not.
    pub(crate) fn create_phantom_chain(
        &self,
        tree: &mut crate::tree::element::ElementTree,
        path: &ResourcePath,
        kind: ResourceKind,
    ) -> Result<bool, ResourceError> {
        let project = path.prefix(1);
        if tree.info(&project).map_or(true, |p| p.is_phantom()) {
            return Ok(false);
        }
        for depth in 2..=path.segment_count() {
            let current = path.prefix(depth);
            if tree.info(&current).is_some() {
                continue;
            }
            let node_kind = if depth == path.segment_count() {
                kind
            } else {
                ResourceKind::Folder
            };
            let mut phantom = ResourceInfo::new(node_kind, self.next_node_id());
            phantom.flags = InfoFlags::PHANTOM;
            phantom.modification_stamp = NULL_STAMP;
            tree.create(&current, phantom)?;
        }
        Ok(true)
    }
}
