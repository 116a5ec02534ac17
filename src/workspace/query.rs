//! Read-only queries and traversal

use super::Workspace;
use crate::error::ResourceError;
use crate::monitor::ProgressMonitor;
use crate::resource::{Container, File, MemberFlags, Resource, ResourceHandle};
use crate::tree::element::ElementTree;
use crate::tree::info::ResourceInfo;
use crate::tree::path::ResourcePath;
use crate::types::{Depth, NodeId, ResourceKind};
use serde::Serialize;
use std::path::PathBuf;

/// Snapshot of one resource's state, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSummary {
    pub path: ResourcePath,
    pub kind: ResourceKind,
    pub node_id: NodeId,
    pub modification_stamp: i64,
    pub phantom: bool,
    pub open: bool,
    pub local_exists: bool,
    pub link: bool,
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    pub derived: bool,
    pub team_private: bool,
    pub hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_target: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    pub markers: usize,
    pub filters: usize,
}

impl ResourceSummary {
    fn new(path: &ResourcePath, info: &ResourceInfo) -> Self {
        Self {
            path: path.clone(),
            kind: info.kind,
            node_id: info.node_id,
            modification_stamp: info.stamp(),
            phantom: info.is_phantom(),
            open: info.is_open(),
            local_exists: info.local_exists(),
            link: info.is_link(),
            is_virtual: info.is_virtual(),
            derived: info.is_derived(),
            team_private: info.is_team_private(),
            hidden: info.is_hidden(),
            link_target: info.link_target.clone(),
            charset: info.charset.clone(),
            markers: info.visible_markers().map_or(0, |m| m.len()),
            filters: info.filters.len(),
        }
    }
}

fn admitted(info: &ResourceInfo, flags: MemberFlags) -> bool {
    (!info.is_phantom() || flags.contains(MemberFlags::INCLUDE_PHANTOMS))
        && (!info.is_team_private() || flags.contains(MemberFlags::INCLUDE_TEAM_PRIVATE))
        && (!info.is_hidden() || flags.contains(MemberFlags::INCLUDE_HIDDEN))
}

impl Workspace {
    /// Whether a live resource of the handle's kind exists at its path.
    pub fn exists<R: ResourceHandle + ?Sized>(&self, resource: &R) -> bool {
        let tree = self.tree.read();
        tree.visible_info(resource.path())
            .map_or(false, |info| !info.is_phantom() && info.kind == resource.kind())
    }

    /// Whether the tree holds only a phantom at the resource's path.
    pub fn is_phantom<R: ResourceHandle + ?Sized>(&self, resource: &R) -> bool {
        self.tree.read().info(resource.path()).map_or(false, |info| info.is_phantom())
    }

    pub fn is_linked<R: ResourceHandle + ?Sized>(&self, resource: &R) -> bool {
        self.with_live_info(resource.path(), |info| info.is_link())
    }

    pub fn is_virtual<R: ResourceHandle + ?Sized>(&self, resource: &R) -> bool {
        self.with_live_info(resource.path(), |info| info.is_virtual())
    }

    /// Whether the resource has content in the file system.
    pub fn is_local<R: ResourceHandle + ?Sized>(&self, resource: &R) -> bool {
        self.with_live_info(resource.path(), |info| info.local_exists())
    }

    /// Whether the file system at and below the resource matches the tree.
    pub fn is_synchronized<R: ResourceHandle + ?Sized>(&self, resource: &R) -> bool {
        let tree = self.tree.read();
        self.check_synchronized(&tree, resource.path()).is_ok()
    }

    /// Modification stamp, or [`crate::types::NULL_STAMP`] for missing resources.
    pub fn modification_stamp<R: ResourceHandle + ?Sized>(&self, resource: &R) -> i64 {
        self.tree
            .read()
            .visible_info(resource.path())
            .map_or(crate::types::NULL_STAMP, |info| info.stamp())
    }

    fn with_live_info<T: Default>(&self, path: &ResourcePath, read: impl FnOnce(&ResourceInfo) -> T) -> T {
        let tree = self.tree.read();
        tree.visible_info(path)
            .filter(|info| !info.is_phantom())
            .map(|info| read(info))
            .unwrap_or_default()
    }

    /// Summary of an existing resource. Phantoms are reported too.
    pub fn resource_info<R: ResourceHandle + ?Sized>(&self, resource: &R) -> Result<ResourceSummary, ResourceError> {
        let tree = self.tree.read();
        let info = tree
            .visible_info(resource.path())
            .ok_or_else(|| ResourceError::NotFound(resource.path().clone()))?;
        Ok(ResourceSummary::new(resource.path(), info))
    }

    /// Members of a container, in name order.
    pub fn members<C: Container + ?Sized>(&self, container: &C, flags: MemberFlags) -> Result<Vec<Resource>, ResourceError> {
        let tree = self.tree.read();
        let path = container.path();
        let info = self.check_accessible(&tree, path, None)?;
        if info.kind == ResourceKind::Project && !info.is_open() {
            return Err(ResourceError::ProjectClosed(path.clone()));
        }
        self.check_link_local(&tree, path)?;
        Ok(member_list(&tree, path, flags))
    }

    /// Live member at `relative` below `container`.
    pub fn find_member<C: Container + ?Sized>(&self, container: &C, relative: &str) -> Option<Resource> {
        let segments: Vec<String> = relative
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let path = container.path().join_segments(&segments);
        let tree = self.tree.read();
        tree.visible_info(&path)
            .filter(|info| !info.is_phantom())
            .map(|info| Resource::from_kind(path.clone(), info.kind))
    }

    /// Read a file's contents. Without `force` the file must be in sync
    /// with the file system.
    pub fn contents(&self, file: &File, force: bool) -> Result<Vec<u8>, ResourceError> {
        let tree = self.tree.read();
        let path = file.path();
        self.check_link_local(&tree, path)?;
        let info = self.check_accessible(&tree, path, Some(ResourceKind::File))?;
        let location = self.require_location(&tree, path)?;
        drop(tree);

        let disk = self.store.fetch_info(&location)?;
        if !disk.exists || disk.is_directory {
            return Err(ResourceError::OutOfSync(path.clone()));
        }
        if !force && info.local != Some(disk.local_state()) {
            return Err(ResourceError::OutOfSync(path.clone()));
        }
        self.store.read(&location)
    }

    /// Visit `resource` and its members to `depth` in pre-order. The
    /// visitor returns whether to descend into the visited resource. The
    /// tree is not locked while the visitor runs.
    pub fn accept<R, F>(
        &self,
        resource: &R,
        depth: Depth,
        flags: MemberFlags,
        monitor: &dyn ProgressMonitor,
        mut visitor: F,
    ) -> Result<(), ResourceError>
    where
        R: ResourceHandle + ?Sized,
        F: FnMut(&Resource) -> Result<bool, ResourceError>,
    {
        {
            let tree = self.tree.read();
            let start = tree
                .visible_info(resource.path())
                .ok_or_else(|| ResourceError::NotFound(resource.path().clone()))?;
            if !admitted(start, flags) {
                return Err(ResourceError::NotFound(resource.path().clone()));
            }
        }

        let mut pending = vec![(resource.path().clone(), depth)];
        while let Some((path, depth)) = pending.pop() {
            if monitor.is_canceled() {
                return Err(ResourceError::Canceled);
            }
            let (current, members) = {
                let tree = self.tree.read();
                let Some(info) = tree.visible_info(&path) else {
                    // removed by an earlier visit
                    continue;
                };
                let members = match depth.below() {
                    Some(below) if info.exposes_children() => member_list(&tree, &path, flags)
                        .into_iter()
                        .map(|member| (member.path().clone(), below))
                        .collect(),
                    _ => Vec::new(),
                };
                (Resource::from_kind(path.clone(), info.kind), members)
            };
            monitor.worked(1);
            if visitor(&current)? {
                pending.extend(members.into_iter().rev());
            }
        }
        Ok(())
    }
}

fn member_list(tree: &ElementTree, path: &ResourcePath, flags: MemberFlags) -> Vec<Resource> {
    tree.children(path)
        .into_iter()
        .filter(|(_, info)| admitted(info, flags))
        .map(|(name, info)| Resource::from_kind(path.append(&name), info.kind))
        .collect()
}
