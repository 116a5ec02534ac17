//! Resource creation and deletion

use super::Workspace;
use crate::error::{MultiStatus, ResourceError};
use crate::monitor::{NullMonitor, ProgressMonitor};
use crate::refresh::Refresher;
use crate::resource::{CreateFlags, File, Folder, ResourceHandle, UpdateFlags};
use crate::rules::SchedulingRule;
use crate::store::FileInfo;
use crate::tree::element::{ElementTree, Visit};
use crate::tree::info::{InfoFlags, ResourceInfo};
use crate::tree::path::ResourcePath;
use crate::types::{Depth, ResourceKind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace};

/// What survives when a subtree leaves the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PhantomPolicy {
    /// Nodes with sync info or markers become phantoms.
    Retain,
    /// Only sync info is kept; used for the source of a move.
    SyncOnly,
    /// Nothing is kept.
    Discard,
}

impl Workspace {
    /// Remove the subtree at `path`, leaving phantoms behind according
    /// to `policy`. Projects never leave phantoms.
    pub(crate) fn remove_subtree(
        &self,
        tree: &mut ElementTree,
        path: &ResourcePath,
        policy: PhantomPolicy,
    ) -> Result<(), ResourceError> {
        let Some(slot) = tree.lookup(path) else {
            return Ok(());
        };
        if policy == PhantomPolicy::Discard || path.segment_count() == 1 {
            return tree.remove(path);
        }
        let sync_only = policy == PhantomPolicy::SyncOnly;
        let mut to_phantom = |_: &[String], info: &ResourceInfo, kept: bool| {
            let reason = if sync_only {
                info.has_sync_info()
            } else {
                info.retains_phantom()
            };
            if !reason && !kept {
                return None;
            }
            let mut phantom = if info.is_phantom() {
                info.clone()
            } else {
                info.to_phantom(self.next_node_id())
            };
            if sync_only {
                phantom.markers = None;
            }
            Some(phantom)
        };
        let remains = tree.transform_subtree(slot, &mut to_phantom);
        tree.remove(path)?;
        if let Some(remains) = remains {
            trace!(path = %path, "Keeping phantoms of removed subtree");
            tree.graft(path, remains)?;
        }
        Ok(())
    }

    /// Insert `info` at `path`. A phantom of the same kind is revived:
    /// its sync info, markers and phantom children carry over.
    pub(crate) fn place(
        &self,
        tree: &mut ElementTree,
        path: &ResourcePath,
        mut info: ResourceInfo,
    ) -> Result<(), ResourceError> {
        match tree.info(path) {
            Some(existing) if existing.is_phantom() && existing.kind == info.kind => {
                info.sync_info = existing.sync_info.clone();
                info.markers = existing.markers.clone();
                tree.set_info(path, info)
            }
            _ => tree.create(path, info),
        }
    }

    /// Fresh info for something that exists on disk.
    pub(crate) fn local_info(&self, kind: ResourceKind, disk: &FileInfo) -> ResourceInfo {
        let mut info = ResourceInfo::new(kind, self.next_node_id());
        info.flags = InfoFlags::LOCAL_EXISTS;
        info.local = Some(disk.local_state());
        info.modification_stamp = self.next_stamp();
        if kind == ResourceKind::File {
            info.content_id = self.next_content_id();
        }
        info
    }

    pub(crate) fn virtual_info(&self) -> ResourceInfo {
        let mut info = ResourceInfo::new(ResourceKind::Folder, self.next_node_id());
        info.flags = InfoFlags::VIRTUAL | InfoFlags::LOCAL_EXISTS;
        info.modification_stamp = self.next_stamp();
        info
    }

    /// Info of a link to `target`. Whether the target exists is recorded,
    /// not enforced.
    pub(crate) fn link_info(
        &self,
        path: &ResourcePath,
        kind: ResourceKind,
        target: &Path,
    ) -> Result<ResourceInfo, ResourceError> {
        let disk = self.store.fetch_info(target)?;
        let exists = disk.exists && disk.is_directory == (kind == ResourceKind::Folder);
        let mut info = if exists {
            self.local_info(kind, &disk)
        } else {
            let mut info = ResourceInfo::new(kind, self.next_node_id());
            info.modification_stamp = self.next_stamp();
            info
        };
        info.flags.insert(InfoFlags::LINK);
        info.link_target = Some(target.to_path_buf());
        if exists && kind == ResourceKind::File {
            let contents = self.store.read(target)?;
            info.detected_charset = path
                .last_segment()
                .and_then(|name| self.detect_charset(name, &contents));
        }
        Ok(info)
    }

    /// Create a folder, on disk unless it is virtual.
    ///
    /// With `FORCE` an existing directory is adopted together with its
    /// contents; without it an existing directory is out of sync.
    pub fn create_folder(&self, folder: &Folder, flags: CreateFlags) -> Result<(), ResourceError> {
        let path = folder.path().clone();
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            ws.check_parent(&tree, &path)?;
            ws.check_absent(&tree, &path)?;
            ws.check_link_local(&tree, &path)?;

            if flags.contains(CreateFlags::VIRTUAL) {
                let mut info = ws.virtual_info();
                apply_create_flags(&mut info, flags);
                ws.place(&mut tree, &path, info)?;
                let relative = super::project::project_relative(&path);
                ws.update_description(&mut tree, &path.prefix(1), |d| {
                    d.links.push(crate::description::LinkDescription {
                        path: relative,
                        kind: crate::description::LinkKind::Folder,
                        location: None,
                    });
                })?;
                info!(path = %path, "Virtual folder created");
                return Ok(());
            }

            let location = ws.require_location(&tree, &path)?;
            let existing = ws.store.fetch_info(&location)?;
            let adopted = existing.exists;
            if adopted {
                if !existing.is_directory {
                    return Err(ResourceError::WrongTypeLocal { path, location });
                }
                if !flags.contains(CreateFlags::FORCE) {
                    return Err(ResourceError::OutOfSync(path));
                }
            } else {
                ws.store.mkdir(&location, false)?;
            }
            let disk = ws.store.fetch_info(&location)?;
            let mut info = ws.local_info(ResourceKind::Folder, &disk);
            apply_create_flags(&mut info, flags);
            ws.place(&mut tree, &path, info)?;
            if adopted {
                let mut refresher = Refresher::new(ws, &NullMonitor);
                refresher.sync_children(&mut tree, &path, Depth::Infinite)?;
                refresher.finish()?;
            }
            ws.refresh_aliases(&mut tree, &path)?;
            info!(path = %path, adopted, "Folder created");
            Ok(())
        })
    }

    /// Create a file with `contents`. With `FORCE` an existing local file
    /// is overwritten.
    pub fn create_file(&self, file: &File, contents: &[u8], flags: CreateFlags) -> Result<(), ResourceError> {
        let path = file.path().clone();
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            ws.check_parent(&tree, &path)?;
            ws.check_absent(&tree, &path)?;
            ws.check_link_local(&tree, &path)?;

            let location = ws.require_location(&tree, &path)?;
            let existing = ws.store.fetch_info(&location)?;
            if existing.exists {
                if existing.is_directory {
                    return Err(ResourceError::WrongTypeLocal { path, location });
                }
                if !flags.contains(CreateFlags::FORCE) {
                    return Err(ResourceError::OutOfSync(path));
                }
            }
            ws.store.write(&location, contents)?;
            let disk = ws.store.fetch_info(&location)?;
            let mut info = ws.local_info(ResourceKind::File, &disk);
            info.detected_charset = ws.detect_charset(file.name(), contents);
            apply_create_flags(&mut info, flags);
            ws.place(&mut tree, &path, info)?;
            ws.refresh_aliases(&mut tree, &path)?;
            debug!(path = %path, bytes = contents.len(), "File created");
            Ok(())
        })
    }

    /// Create a linked file or folder pointing at `location`.
    ///
    /// The target must exist with the matching type unless
    /// `ALLOW_MISSING_LOCAL` is given. The link is recorded in the
    /// project description.
    pub fn create_link<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        location: &Path,
        flags: CreateFlags,
    ) -> Result<(), ResourceError> {
        let path = resource.path().clone();
        let kind = resource.kind();
        if !matches!(kind, ResourceKind::File | ResourceKind::Folder) {
            return Err(ResourceError::DerivedRootOrProject {
                path,
                operation: "create link",
            });
        }
        if !location.is_absolute() {
            return Err(ResourceError::invalid(
                &path,
                format!("link location '{}' is not absolute", location.display()),
            ));
        }
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            ws.check_parent(&tree, &path)?;
            ws.check_absent(&tree, &path)?;
            ws.check_link_local(&tree, &path)?;

            let mut info = ws.link_info(&path, kind, location)?;
            if !info.local_exists() {
                let disk = ws.store.fetch_info(location)?;
                if disk.exists {
                    return Err(ResourceError::WrongTypeLocal {
                        path,
                        location: location.to_path_buf(),
                    });
                }
                if !flags.contains(CreateFlags::ALLOW_MISSING_LOCAL) {
                    return Err(ResourceError::LinkMissingLocal {
                        path,
                        location: location.to_path_buf(),
                    });
                }
            }
            apply_create_flags(&mut info, flags);
            let exists = info.local_exists();
            ws.place(&mut tree, &path, info)?;

            let relative = super::project::project_relative(&path);
            let link_kind = match kind {
                ResourceKind::File => crate::description::LinkKind::File,
                _ => crate::description::LinkKind::Folder,
            };
            ws.update_description(&mut tree, &path.prefix(1), |d| {
                d.links.retain(|l| l.path != relative);
                d.links.push(crate::description::LinkDescription {
                    path: relative,
                    kind: link_kind,
                    location: Some(location.to_path_buf()),
                });
            })?;
            ws.invalidate_aliases();

            if exists && kind == ResourceKind::Folder {
                let mut refresher = Refresher::new(ws, &NullMonitor);
                refresher.sync_children(&mut tree, &path, Depth::Infinite)?;
                refresher.finish()?;
            }
            info!(path = %path, target = %location.display(), exists, "Link created");
            Ok(())
        })
    }

    /// Delete a resource from the workspace and the file system.
    ///
    /// Without `FORCE` the subtree must be in sync with the file system;
    /// nothing is deleted otherwise. Link targets are never deleted.
    /// Deleting a project delegates to [`Workspace::delete_project`].
    pub fn delete<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        flags: UpdateFlags,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), ResourceError> {
        let path = resource.path().clone();
        match resource.kind() {
            ResourceKind::Root => {
                return Err(ResourceError::DerivedRootOrProject {
                    path,
                    operation: "delete",
                })
            }
            ResourceKind::Project => return self.delete_project(&path, flags, monitor),
            _ => {}
        }
        let kind = resource.kind();
        self.run(SchedulingRule::for_path(&path), false, monitor, |ws| {
            let start = Instant::now();
            let mut tree = ws.write_tree(&path)?;
            let info = ws.check_accessible(&tree, &path, Some(kind))?;
            if !flags.contains(UpdateFlags::FORCE) {
                ws.check_synchronized(&tree, &path)?;
            }
            if flags.contains(UpdateFlags::KEEP_HISTORY) {
                ws.remember_subtree(&tree, &path);
            }

            monitor.begin_task(&format!("Deleting {}", path), 0);
            let mut status = MultiStatus::new(format!("Problems encountered while deleting {}", path));
            let deleted = ws.delete_local(&tree, &path, &info, monitor, &mut status);
            monitor.done();
            deleted?;
            if !status.is_ok() {
                // whatever did go away on disk leaves the tree too
                ws.reconcile(&mut tree, &path, Depth::Infinite, &NullMonitor, Instant::now())?;
                return status.into_result();
            }

            ws.remove_subtree(&mut tree, &path, PhantomPolicy::Retain)?;
            ws.forget_description_entries(&mut tree, &path)?;
            if info.is_link() {
                ws.invalidate_aliases();
            }
            ws.refresh_aliases(&mut tree, &path)?;
            info!(
                path = %path,
                duration_ms = start.elapsed().as_millis() as u64,
                "Resource deleted"
            );
            Ok(())
        })
    }

    /// Location of `path`, which must not lie inside a virtual folder.
    pub(crate) fn require_location(&self, tree: &ElementTree, path: &ResourcePath) -> Result<PathBuf, ResourceError> {
        self.location_in(tree, path)
            .ok_or_else(|| ResourceError::invalid(path, "only links and virtual folders may live in a virtual folder"))
    }

    /// Fails with every resource under `path` whose local state differs
    /// from what the tree recorded. Missing link targets are skipped.
    pub(crate) fn check_synchronized(&self, tree: &ElementTree, path: &ResourcePath) -> Result<(), ResourceError> {
        let mut status = MultiStatus::new(format!("{} is not in sync with the file system", path));
        tree.walk(path, |current, info| {
            if info.is_phantom() || (info.is_link() && !info.local_exists()) {
                return Ok(Visit::SkipChildren);
            }
            if info.is_virtual() || info.kind == ResourceKind::Root {
                return Ok(Visit::Continue);
            }
            let Some(location) = self.location_in(tree, current) else {
                return Ok(Visit::Continue);
            };
            let disk = self.store.fetch_info(&location)?;
            let in_sync = match info.kind {
                ResourceKind::File => disk.exists && !disk.is_directory && info.local == Some(disk.local_state()),
                _ => disk.exists && disk.is_directory,
            };
            if !in_sync {
                status.add(ResourceError::OutOfSync(current.clone()));
                return Ok(Visit::SkipChildren);
            }
            Ok(Visit::Continue)
        })?;
        status.into_result()
    }

    /// Delete the local content of `path` one resource at a time.
    /// Failures are collected; cancellation stops immediately.
    pub(crate) fn delete_local(
        &self,
        tree: &ElementTree,
        path: &ResourcePath,
        info: &ResourceInfo,
        monitor: &dyn ProgressMonitor,
        status: &mut MultiStatus,
    ) -> Result<(), ResourceError> {
        monitor.worked(1);
        if monitor.is_canceled() {
            return Err(ResourceError::Canceled);
        }
        if info.is_phantom() || info.is_link() {
            return Ok(());
        }
        for (name, child) in tree.children(path) {
            if child.kind.is_container() || child.is_link() {
                self.delete_local(tree, &path.append(&name), &child, monitor, status)?;
            }
        }
        if info.is_virtual() {
            return Ok(());
        }
        if let Some(location) = self.location_in(tree, path) {
            if let Err(err) = self.store.delete(&location) {
                status.add(err);
            }
        }
        Ok(())
    }
}

fn apply_create_flags(info: &mut ResourceInfo, flags: CreateFlags) {
    info.flags.set(InfoFlags::DERIVED, flags.contains(CreateFlags::DERIVED));
    info.flags.set(InfoFlags::TEAM_PRIVATE, flags.contains(CreateFlags::TEAM_PRIVATE));
    info.flags.set(InfoFlags::HIDDEN, flags.contains(CreateFlags::HIDDEN));
}
