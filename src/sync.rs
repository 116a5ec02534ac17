//! Sync partner info
//!
//! Registered partners attach opaque bytes to resources. Setting bytes on
//! a resource that no longer exists creates a phantom for it; clearing
//! the last entry of a phantom prunes it and any ancestor phantom left
//! without a reason to exist.

use crate::error::ResourceError;
use crate::monitor::NullMonitor;
use crate::resource::ResourceHandle;
use crate::rules::SchedulingRule;
use crate::tree::element::{ElementTree, Visit};
use crate::tree::info::SyncTable;
use crate::tree::path::ResourcePath;
use crate::types::{Depth, QualifiedName};
use crate::workspace::Workspace;
use std::sync::Arc;
use tracing::{debug, info};

impl Workspace {
    pub fn register_sync_partner(&self, partner: QualifiedName) {
        if self.sync_partners.write().insert(partner.clone()) {
            info!(partner = %partner, "Sync partner registered");
        }
    }

    /// Unregister `partner` and drop all of its info.
    pub fn unregister_sync_partner(&self, partner: &QualifiedName) -> Result<(), ResourceError> {
        if !self.sync_partners.read().contains(partner) {
            return Ok(());
        }
        self.flush_sync_info(partner, &self.root(), Depth::Infinite)?;
        self.sync_partners.write().remove(partner);
        info!(partner = %partner, "Sync partner unregistered");
        Ok(())
    }

    pub fn sync_partners(&self) -> Vec<QualifiedName> {
        self.sync_partners.read().iter().cloned().collect()
    }

    fn check_partner(&self, partner: &QualifiedName) -> Result<(), ResourceError> {
        if self.sync_partners.read().contains(partner) {
            Ok(())
        } else {
            Err(ResourceError::UnknownSyncPartner(partner.clone()))
        }
    }

    /// Set or clear `partner`'s bytes on `resource`.
    ///
    /// Bytes on a missing resource create a phantom; clearing the last
    /// entry of a phantom prunes it.
    pub fn set_sync_info<R: ResourceHandle + ?Sized>(
        &self,
        partner: &QualifiedName,
        resource: &R,
        bytes: Option<&[u8]>,
    ) -> Result<(), ResourceError> {
        self.check_partner(partner)?;
        let path = resource.path().clone();
        if path.is_root() {
            return Err(ResourceError::invalid(&path, "the workspace root has no sync info"));
        }
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            if tree.info(&path).is_none() {
                if bytes.is_none() {
                    return Ok(());
                }
                if !ws.create_phantom_chain(&mut tree, &path, resource.kind())? {
                    return Err(ResourceError::NotFound(path.prefix(1)));
                }
                debug!(path = %path, partner = %partner, "Created phantom for sync info");
            }
            let unchanged = tree.info(&path).map_or(false, |info| {
                info.sync_info.as_ref().and_then(|t| t.get(partner)).map(Vec::as_slice) == bytes
            });
            if unchanged {
                return Ok(());
            }
            tree.update(&path, |info| {
                let mut table = info.sync_info.as_deref().cloned().unwrap_or_else(SyncTable::new);
                match bytes {
                    Some(bytes) => {
                        table.insert(partner.clone(), bytes.to_vec());
                    }
                    None => {
                        table.remove(partner);
                    }
                }
                info.sync_info = (!table.is_empty()).then(|| Arc::new(table));
            })?;
            if bytes.is_none() {
                ws.prune_phantoms(&mut tree, &path)?;
            }
            Ok(())
        })
    }

    /// `partner`'s bytes on `resource`, phantoms included.
    pub fn sync_info<R: ResourceHandle + ?Sized>(
        &self,
        partner: &QualifiedName,
        resource: &R,
    ) -> Result<Option<Vec<u8>>, ResourceError> {
        self.check_partner(partner)?;
        let tree = self.tree.read();
        Ok(tree
            .info(resource.path())
            .and_then(|info| info.sync_info.as_ref())
            .and_then(|table| table.get(partner))
            .cloned())
    }

    /// Drop `partner`'s info from `resource` and its members to `depth`.
    pub fn flush_sync_info<R: ResourceHandle + ?Sized>(
        &self,
        partner: &QualifiedName,
        resource: &R,
        depth: Depth,
    ) -> Result<(), ResourceError> {
        self.check_partner(partner)?;
        let base = resource.path().clone();
        self.run(SchedulingRule::for_path(&base), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&base)?;
            let mut holders = Vec::new();
            tree.walk(&base, |path, info| {
                let below = path.segment_count() - base.segment_count();
                if info.sync_info.as_ref().map_or(false, |t| t.contains_key(partner)) {
                    holders.push(path.clone());
                }
                let descend = match depth {
                    Depth::Zero => false,
                    Depth::One => below == 0,
                    Depth::Infinite => true,
                };
                Ok(if descend { Visit::Continue } else { Visit::SkipChildren })
            })?;
            // deepest first so pruning can climb through emptied parents
            holders.reverse();
            for path in &holders {
                tree.update(path, |info| {
                    let mut table = info.sync_info.as_deref().cloned().unwrap_or_default();
                    table.remove(partner);
                    info.sync_info = (!table.is_empty()).then(|| Arc::new(table));
                })?;
                ws.prune_phantoms(&mut tree, path)?;
            }
            debug!(partner = %partner, base = %base, flushed = holders.len(), "Flushed sync info");
            Ok(())
        })
    }

    /// Remove the phantom at `path` and each phantom ancestor that no
    /// longer carries sync info, markers or children.
    pub(crate) fn prune_phantoms(&self, tree: &mut ElementTree, path: &ResourcePath) -> Result<(), ResourceError> {
        let mut current = path.clone();
        while current.segment_count() > 1 {
            let prunable = tree.info(&current).map_or(false, |info| {
                info.is_phantom() && !info.has_sync_info() && !info.has_markers()
            }) && tree.child_names(&current).is_empty();
            if !prunable {
                break;
            }
            tree.remove(&current)?;
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(())
    }
}
