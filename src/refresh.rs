//! File-system reconciliation
//!
//! Refresh compares the tree with the file store one name at a time.
//! New disk entries become resources unless a filter of their container
//! hides them, vanished entries are removed (keeping phantoms for sync
//! info and markers), kind flips replace the node, and changed files get
//! a new content id. Links and virtual folders are never removed by a
//! refresh; a link whose target is missing loses its local children.

use crate::error::{MultiStatus, ResourceError};
use crate::filter::FilterSet;
use crate::monitor::ProgressMonitor;
use crate::resource::ResourceHandle;
use crate::rules::SchedulingRule;
use crate::store::FileInfo;
use crate::tree::element::ElementTree;
use crate::tree::info::{InfoFlags, ResourceInfo};
use crate::tree::path::{validate_segment, ResourcePath};
use crate::types::{Depth, ResourceKind};
use crate::workspace::{PhantomPolicy, Workspace};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

/// One reconciliation pass. Per-entry store failures are collected and
/// reported by [`Refresher::finish`]; cancellation aborts immediately.
pub(crate) struct Refresher<'a> {
    workspace: &'a Workspace,
    monitor: &'a dyn ProgressMonitor,
    status: MultiStatus,
    changed: usize,
}

impl<'a> Refresher<'a> {
    pub fn new(workspace: &'a Workspace, monitor: &'a dyn ProgressMonitor) -> Self {
        Self {
            workspace,
            monitor,
            status: MultiStatus::new("Problems occurred while refreshing"),
            changed: 0,
        }
    }

    /// Number of nodes changed, or the collected failures.
    pub fn finish(self) -> Result<usize, ResourceError> {
        let changed = self.changed;
        self.status.into_result().map(|_| changed)
    }

    fn tick(&self) -> Result<(), ResourceError> {
        self.monitor.worked(1);
        if self.monitor.is_canceled() {
            return Err(ResourceError::Canceled);
        }
        Ok(())
    }

    /// Reconcile `path` to `depth`.
    pub fn refresh(&mut self, tree: &mut ElementTree, path: &ResourcePath, depth: Depth) -> Result<(), ResourceError> {
        if path.is_root() {
            if let Some(below) = depth.below() {
                for (name, info) in tree.children(path) {
                    if !info.is_phantom() {
                        self.refresh(tree, &path.append(&name), below)?;
                    }
                }
            }
            return Ok(());
        }
        if path.segment_count() == 1 {
            let open = tree.info(path).map_or(false, |i| !i.is_phantom() && i.is_open());
            if !open {
                return Ok(());
            }
            self.tick()?;
            if let Some(below) = depth.below() {
                self.sync_children(tree, path, below)?;
            }
            return Ok(());
        }
        let (Some(parent), Some(name)) = (path.parent(), path.last_segment()) else {
            return Ok(());
        };
        let parent_live = tree
            .visible_info(&parent)
            .map_or(false, |i| !i.is_phantom() && i.exposes_children());
        if !parent_live {
            return Ok(());
        }
        self.sync_member(tree, &parent, name, depth)
    }

    /// Reconcile every child of `container`, each to `depth`.
    pub fn sync_children(
        &mut self,
        tree: &mut ElementTree,
        container: &ResourcePath,
        depth: Depth,
    ) -> Result<(), ResourceError> {
        let Some(info) = tree.info(container).cloned() else {
            return Ok(());
        };
        let mut names: BTreeSet<String> = tree
            .children(container)
            .into_iter()
            .filter(|(_, child)| !child.is_phantom())
            .map(|(name, _)| name)
            .collect();
        let listable = !info.is_virtual() && !(info.is_link() && !info.local_exists());
        if listable {
            if let Some(location) = self.workspace.location_in(tree, container) {
                match self.list(&location) {
                    Ok(listed) => names.extend(listed),
                    Err(err) => {
                        self.status.add(err);
                        return Ok(());
                    }
                }
            }
        }
        for name in names {
            if validate_segment(&name).is_err() {
                trace!(container = %container, name, "Skipping entry with an invalid name");
                continue;
            }
            self.sync_member(tree, container, &name, depth)?;
        }
        Ok(())
    }

    fn list(&self, location: &Path) -> Result<Vec<String>, ResourceError> {
        let disk = self.workspace.store.fetch_info(location)?;
        if disk.exists && disk.is_directory {
            self.workspace.store.list(location)
        } else {
            Ok(Vec::new())
        }
    }

    /// Reconcile the single child `name` of `parent`; `depth` applies to
    /// the child itself.
    pub fn sync_member(
        &mut self,
        tree: &mut ElementTree,
        parent: &ResourcePath,
        name: &str,
        depth: Depth,
    ) -> Result<(), ResourceError> {
        self.tick()?;
        let path = parent.append(name);
        let existing = tree.info(&path).cloned();
        let live = existing.as_ref().filter(|i| !i.is_phantom()).cloned();

        if let Some(info) = &live {
            if info.is_link() {
                return self.sync_link(tree, &path, info, depth);
            }
            if info.is_virtual() {
                if let Some(below) = depth.below() {
                    self.sync_children(tree, &path, below)?;
                }
                return Ok(());
            }
        }

        let Some(location) = self.workspace.location_in(tree, &path) else {
            // virtual folders only hold links and other virtual folders
            if live.is_some() {
                self.remove(tree, &path)?;
            }
            return Ok(());
        };
        let disk = match self.workspace.store.fetch_info(&location) {
            Ok(disk) => disk,
            Err(err) => {
                self.status.add(err);
                return Ok(());
            }
        };
        let visible = disk.exists && self.admits(tree, parent, name, disk.is_directory);

        match (live, visible) {
            (None, false) => Ok(()),
            (Some(_), false) => self.remove(tree, &path),
            (None, true) => {
                self.add(tree, &path, &location, &disk)?;
                self.descend(tree, &path, &disk, depth)
            }
            (Some(info), true) => {
                let kind = disk_kind(&disk);
                if info.kind != kind {
                    trace!(path = %path, from = %info.kind, to = %kind, "Resource changed type on disk");
                    tree.remove(&path)?;
                    self.add(tree, &path, &location, &disk)?;
                } else if kind == ResourceKind::File && info.local != Some(disk.local_state()) {
                    self.update_file(tree, &path, &location, &disk)?;
                }
                self.descend(tree, &path, &disk, depth)
            }
        }
    }

    fn descend(
        &mut self,
        tree: &mut ElementTree,
        path: &ResourcePath,
        disk: &FileInfo,
        depth: Depth,
    ) -> Result<(), ResourceError> {
        match depth.below() {
            Some(below) if disk.is_directory => self.sync_children(tree, path, below),
            _ => Ok(()),
        }
    }

    /// Whether a disk entry may become a member of `parent`.
    fn admits(&self, tree: &ElementTree, parent: &ResourcePath, name: &str, is_folder: bool) -> bool {
        let config = &self.workspace.config;
        if !config.refresh.include_dot_entries
            && name.starts_with('.')
            && name != config.workspace.description_file
        {
            return false;
        }
        FilterSet::for_container(tree, parent).is_visible(name, is_folder)
    }

    fn add(
        &mut self,
        tree: &mut ElementTree,
        path: &ResourcePath,
        location: &Path,
        disk: &FileInfo,
    ) -> Result<(), ResourceError> {
        let kind = disk_kind(disk);
        let mut info = self.workspace.local_info(kind, disk);
        if kind == ResourceKind::File {
            info.detected_charset = self.detect(path, location);
        }
        trace!(path = %path, kind = %kind, "Discovered on disk");
        self.changed += 1;
        self.workspace.place(tree, path, info)
    }

    fn update_file(
        &mut self,
        tree: &mut ElementTree,
        path: &ResourcePath,
        location: &Path,
        disk: &FileInfo,
    ) -> Result<(), ResourceError> {
        let detected = self.detect(path, location);
        let content_id = self.workspace.next_content_id();
        let stamp = self.workspace.next_stamp();
        trace!(path = %path, "Content changed on disk");
        self.changed += 1;
        tree.update(path, |info| {
            info.local = Some(disk.local_state());
            info.content_id = content_id;
            info.modification_stamp = stamp;
            info.detected_charset = detected;
            info.flags.insert(InfoFlags::LOCAL_EXISTS);
        })
    }

    fn remove(&mut self, tree: &mut ElementTree, path: &ResourcePath) -> Result<(), ResourceError> {
        trace!(path = %path, "Vanished from disk");
        self.changed += 1;
        self.workspace.remove_subtree(tree, path, PhantomPolicy::Retain)
    }

    fn sync_link(
        &mut self,
        tree: &mut ElementTree,
        path: &ResourcePath,
        info: &Arc<ResourceInfo>,
        depth: Depth,
    ) -> Result<(), ResourceError> {
        let Some(target) = info.link_target.clone() else {
            return Ok(());
        };
        let disk = match self.workspace.store.fetch_info(&target) {
            Ok(disk) => disk,
            Err(err) => {
                self.status.add(err);
                return Ok(());
            }
        };
        let is_folder = info.kind == ResourceKind::Folder;
        let exists = disk.exists && disk.is_directory == is_folder;
        if exists != info.local_exists() {
            debug!(path = %path, target = %target.display(), exists, "Link target changed state");
            self.changed += 1;
            tree.update(path, |i| {
                i.flags.set(InfoFlags::LOCAL_EXISTS, exists);
                i.local = exists.then(|| disk.local_state());
            })?;
        }
        if !is_folder {
            if exists && info.local.is_some() && info.local != Some(disk.local_state()) {
                self.update_file(tree, path, &target, &disk)?;
            }
            return Ok(());
        }
        if !exists {
            for (name, child) in tree.children(path) {
                if !child.is_phantom() && !child.is_link() && !child.is_virtual() {
                    self.remove(tree, &path.append(&name))?;
                }
            }
            return Ok(());
        }
        match depth.below() {
            Some(below) => self.sync_children(tree, path, below),
            None => Ok(()),
        }
    }

    fn detect(&self, path: &ResourcePath, location: &Path) -> Option<String> {
        let name = path.last_segment()?;
        let contents = self.workspace.store.read(location).ok()?;
        self.workspace.detect_charset(name, &contents)
    }
}

fn disk_kind(disk: &FileInfo) -> ResourceKind {
    if disk.is_directory {
        ResourceKind::Folder
    } else {
        ResourceKind::File
    }
}

impl Workspace {
    /// Bring the tree at `resource` in line with the file system, to
    /// `depth`. Cancellation restores the subtree to its state before
    /// the refresh.
    pub fn refresh_local<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        depth: Depth,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), ResourceError> {
        let path = resource.path().clone();
        self.run(SchedulingRule::for_path(&path), false, monitor, |ws| {
            let start = Instant::now();
            monitor.begin_task(&format!("Refreshing {}", path), 0);
            let mut tree = ws.write_tree(&path)?;
            self.reconcile(&mut tree, &path, depth, monitor, start)
        })
    }

    /// Refresh inside an operation that already holds the tree.
    pub(crate) fn reconcile(
        &self,
        tree: &mut ElementTree,
        path: &ResourcePath,
        depth: Depth,
        monitor: &dyn ProgressMonitor,
        start: Instant,
    ) -> Result<(), ResourceError> {
        let checkpoint = tree.snapshot();
        let mut refresher = Refresher::new(self, monitor);
        let outcome = refresher.refresh(tree, path, depth);
        let restored = match &outcome {
            Err(_) => tree.restore_subtree(&checkpoint, path),
            Ok(()) => Ok(()),
        };
        tree.release(checkpoint);
        monitor.done();
        if let Err(err) = outcome {
            debug!(path = %path, error = %err, "Refresh aborted, subtree restored");
            restored?;
            return Err(err);
        }
        let changed = refresher.finish()?;
        info!(
            path = %path,
            depth = ?depth,
            changed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Refresh complete"
        );
        Ok(())
    }
}
