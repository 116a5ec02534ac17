//! Moves and copies
//!
//! A move keeps node identities so the delta reports it as a move; sync
//! info stays behind on a phantom at the source. A copy creates fresh
//! resources with persistent properties but without markers or sync
//! info. Links are moved and copied as links when `SHALLOW` is given (and
//! always when nested inside the copied subtree); otherwise the content
//! they point at is materialized at the destination.

use super::{PhantomPolicy, Workspace};
use crate::description::{LinkDescription, LinkKind};
use crate::error::{MultiStatus, ResourceError};
use crate::monitor::ProgressMonitor;
use crate::refresh::Refresher;
use crate::resource::{ResourceHandle, UpdateFlags};
use crate::rules::SchedulingRule;
use crate::tree::element::ElementTree;
use crate::tree::info::{InfoFlags, ResourceInfo};
use crate::tree::path::ResourcePath;
use crate::types::{Depth, ResourceKind};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// How a copy treats identity and markers.
#[derive(Debug, Clone, Copy)]
struct CopyPlan {
    flags: UpdateFlags,
    /// Keep node ids and markers; used when a move materializes a link.
    keep_identity: bool,
}

impl Workspace {
    /// Move `source` to `destination`.
    ///
    /// Projects can only be renamed. Without `FORCE` the source must be
    /// in sync with the file system.
    pub fn move_resource<R: ResourceHandle + ?Sized>(
        &self,
        source: &R,
        destination: &ResourcePath,
        flags: UpdateFlags,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), ResourceError> {
        let from = source.path().clone();
        let kind = source.kind();
        validate_transfer(&from, kind, destination, "move")?;
        if kind == ResourceKind::Project {
            return self.move_project(&from, destination, flags, monitor);
        }
        let rule = SchedulingRule::Multiple(vec![from.clone(), destination.clone()]);
        self.run(rule, false, monitor, |ws| {
            let start = Instant::now();
            let mut tree = ws.write_tree(&from)?;
            let info = ws.check_accessible(&tree, &from, Some(kind))?;
            ws.check_target(&tree, destination)?;
            if !flags.contains(UpdateFlags::FORCE) {
                ws.check_synchronized(&tree, &from)?;
            }

            if info.is_link() && !flags.contains(UpdateFlags::SHALLOW) {
                ws.move_link_deep(&mut tree, &from, destination, &info, flags, monitor)?;
            } else {
                ws.move_simple(&mut tree, &from, destination, &info)?;
            }
            ws.history.lock().retain(|p, _| !from.is_prefix_of(p));
            info!(
                from = %from,
                to = %destination,
                duration_ms = start.elapsed().as_millis() as u64,
                "Resource moved"
            );
            Ok(())
        })
    }

    /// Rename on disk (unless nothing is stored there) and re-root the
    /// subtree with its identities.
    fn move_simple(
        &self,
        tree: &mut ElementTree,
        from: &ResourcePath,
        to: &ResourcePath,
        info: &ResourceInfo,
    ) -> Result<(), ResourceError> {
        let on_disk = !info.is_link() && !info.is_virtual();
        if on_disk {
            let source = self.require_location(tree, from)?;
            let target = self.require_location(tree, to)?;
            self.store.rename(&source, &target)?;
        }

        let slot = tree.lookup(from).ok_or_else(|| ResourceError::NotFound(from.clone()))?;
        let mut contains_links = false;
        let mut carry = |_: &[String], info: &ResourceInfo, _: bool| {
            if info.is_phantom() {
                return None;
            }
            contains_links |= info.is_link();
            let mut moved = info.clone();
            moved.sync_info = None;
            Some(moved)
        };
        let moved = tree
            .transform_subtree(slot, &mut carry)
            .ok_or_else(|| ResourceError::NotFound(from.clone()))?;
        self.remove_subtree(tree, from, PhantomPolicy::SyncOnly)?;
        tree.graft(to, moved)?;

        if on_disk && info.kind == ResourceKind::File {
            let target = self.require_location(tree, to)?;
            let disk = self.store.fetch_info(&target)?;
            if info.local != Some(disk.local_state()) {
                tree.update(to, |moved| moved.local = Some(disk.local_state()))?;
            }
        }
        self.rebase_description_entries(tree, from, to, true)?;
        if contains_links {
            self.invalidate_aliases();
        }
        self.refresh_aliases(tree, from)?;
        self.refresh_aliases(tree, to)?;
        Ok(())
    }

    /// Move the content a link points at to the destination, turning it
    /// into a regular resource, and drop the link.
    fn move_link_deep(
        &self,
        tree: &mut ElementTree,
        from: &ResourcePath,
        to: &ResourcePath,
        info: &ResourceInfo,
        flags: UpdateFlags,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), ResourceError> {
        let target = info.link_target.clone().ok_or_else(|| ResourceError::NotFound(from.clone()))?;
        if !info.local_exists() {
            return Err(ResourceError::LinkMissingLocal {
                path: from.clone(),
                location: target,
            });
        }
        let plan = CopyPlan {
            flags,
            keep_identity: true,
        };
        let mut status = MultiStatus::new(format!("Problems encountered while moving {}", from));
        let destination = self.location_in(tree, to);
        let preexisting = match &destination {
            Some(destination) => self.store.fetch_info(destination)?.exists,
            None => true,
        };
        let copied = self.rollback_on_error(tree, &to.prefix(1), |tree| {
            self.copy_member(tree, from, to, info, true, plan, monitor, &mut status)
        });
        if let (Err(_), Some(destination), false) = (&copied, &destination, preexisting) {
            self.store.delete(destination)?;
        }
        copied?;
        status.into_result()?;

        self.store.delete(&target)?;
        self.remove_subtree(tree, from, PhantomPolicy::SyncOnly)?;
        self.rebase_description_entries(tree, from, to, false)?;
        self.invalidate_aliases();
        self.refresh_aliases(tree, to)?;
        debug!(link = %from, target = %target.display(), "Materialized link content");
        Ok(())
    }

    /// Rename a project, moving its default location along with it.
    fn move_project(
        &self,
        from: &ResourcePath,
        to: &ResourcePath,
        flags: UpdateFlags,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), ResourceError> {
        self.run(SchedulingRule::Workspace, false, monitor, |ws| {
            let mut tree = ws.write_tree(from)?;
            let info = ws.check_accessible(&tree, from, Some(ResourceKind::Project))?;
            ws.check_absent(&tree, to)?;
            if info.is_open() && !flags.contains(UpdateFlags::FORCE) {
                ws.check_synchronized(&tree, from)?;
            }
            let old_name = from.project_name().unwrap_or_default();
            let new_name = to.project_name().unwrap_or_default().to_string();
            let custom_location = info.description.as_ref().and_then(|d| d.location.clone());
            if custom_location.is_none() {
                let source = ws.project_location(old_name, &info);
                let target = ws.config.workspace.location.join(&new_name);
                ws.store.rename(&source, &target)?;
            }

            let slot = tree.lookup(from).ok_or_else(|| ResourceError::NotFound(from.clone()))?;
            let mut carry = |_: &[String], info: &ResourceInfo, _: bool| {
                if info.is_phantom() {
                    return None;
                }
                let mut moved = info.clone();
                moved.sync_info = None;
                Some(moved)
            };
            let moved = tree
                .transform_subtree(slot, &mut carry)
                .ok_or_else(|| ResourceError::NotFound(from.clone()))?;
            tree.remove(from)?;
            tree.graft(to, moved)?;

            let mut description = info.description.as_deref().cloned().unwrap_or_default();
            description.name = new_name.clone();
            ws.update_description(&mut tree, to, |d| *d = description)?;
            ws.invalidate_aliases();
            ws.history.lock().retain(|p, _| !from.is_prefix_of(p));
            info!(from = old_name, to = %new_name, "Project renamed");
            Ok(())
        })
    }

    /// Copy `source` to `destination`.
    ///
    /// Per-member failures are collected and reported together; members
    /// that were copied stay. Cancellation undoes the whole copy.
    pub fn copy_resource<R: ResourceHandle + ?Sized>(
        &self,
        source: &R,
        destination: &ResourcePath,
        flags: UpdateFlags,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), ResourceError> {
        let from = source.path().clone();
        let kind = source.kind();
        validate_transfer(&from, kind, destination, "copy")?;
        if kind == ResourceKind::Project {
            return self.copy_project(&from, destination, monitor);
        }
        let rule = SchedulingRule::Multiple(vec![from.clone(), destination.clone()]);
        self.run(rule, false, monitor, |ws| {
            let start = Instant::now();
            let mut tree = ws.write_tree(destination)?;
            let info = ws.check_accessible(&tree, &from, Some(kind))?;
            ws.check_target(&tree, destination)?;
            if !flags.contains(UpdateFlags::FORCE) {
                ws.check_synchronized(&tree, &from)?;
            }

            monitor.begin_task(&format!("Copying {}", from), 0);
            let plan = CopyPlan {
                flags,
                keep_identity: false,
            };
            let mut status = MultiStatus::new(format!("Problems encountered while copying {}", from));
            let target = ws.location_in(&tree, destination);
            let preexisting = match &target {
                Some(target) => ws.store.fetch_info(target)?.exists,
                None => true,
            };
            let copied = ws.rollback_on_error(&mut tree, &destination.prefix(1), |tree| {
                ws.copy_member(tree, &from, destination, &info, true, plan, monitor, &mut status)
            });
            monitor.done();
            if let (Err(_), Some(target), false) = (&copied, &target, preexisting) {
                ws.store.delete(target)?;
            }
            copied?;
            ws.invalidate_aliases();
            ws.refresh_aliases(&mut tree, destination)?;
            info!(
                from = %from,
                to = %destination,
                failures = status.errors.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Resource copied"
            );
            status.into_result()
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_member(
        &self,
        tree: &mut ElementTree,
        from: &ResourcePath,
        to: &ResourcePath,
        info: &ResourceInfo,
        top: bool,
        plan: CopyPlan,
        monitor: &dyn ProgressMonitor,
        status: &mut MultiStatus,
    ) -> Result<(), ResourceError> {
        monitor.worked(1);
        if monitor.is_canceled() {
            return Err(ResourceError::Canceled);
        }
        if info.is_phantom() {
            return Ok(());
        }

        let as_link = info.is_link() && (!top || plan.flags.contains(UpdateFlags::SHALLOW));
        if as_link {
            let Some(target) = info.link_target.clone() else {
                return Ok(());
            };
            let copy = self.derive(self.link_info(to, info.kind, &target)?, info, plan);
            let exists = copy.local_exists();
            self.place(tree, to, copy)?;
            self.describe_link(tree, to, info.kind, Some(target))?;
            if exists && info.kind == ResourceKind::Folder {
                let mut refresher = Refresher::new(self, monitor);
                refresher.sync_children(tree, to, Depth::Infinite)?;
                refresher.finish()?;
            }
            return Ok(());
        }

        if info.is_virtual() {
            let copy = self.derive(self.virtual_info(), info, plan);
            self.place(tree, to, copy)?;
            self.describe_link(tree, to, ResourceKind::Folder, None)?;
            return self.copy_children(tree, from, to, plan, monitor, status);
        }

        let (Some(source), Some(target)) = (self.location_in(tree, from), self.location_in(tree, to)) else {
            status.add(ResourceError::invalid(
                to,
                "only links and virtual folders may live in a virtual folder",
            ));
            return Ok(());
        };
        match info.kind {
            ResourceKind::File => {
                let written = self
                    .store
                    .read(&source)
                    .and_then(|contents| self.store.write(&target, &contents).map(|_| contents));
                let contents = match written {
                    Ok(contents) => contents,
                    Err(err) => {
                        status.add(err);
                        return Ok(());
                    }
                };
                let disk = self.store.fetch_info(&target)?;
                let mut copy = self.derive(self.local_info(ResourceKind::File, &disk), info, plan);
                copy.detected_charset = to.last_segment().and_then(|name| self.detect_charset(name, &contents));
                self.place(tree, to, copy)
            }
            _ => {
                if let Err(err) = self.store.mkdir(&target, false) {
                    status.add(err);
                    return Ok(());
                }
                let disk = self.store.fetch_info(&target)?;
                let copy = self.derive(self.local_info(ResourceKind::Folder, &disk), info, plan);
                self.place(tree, to, copy)?;
                self.copy_children(tree, from, to, plan, monitor, status)
            }
        }
    }

    fn copy_children(
        &self,
        tree: &mut ElementTree,
        from: &ResourcePath,
        to: &ResourcePath,
        plan: CopyPlan,
        monitor: &dyn ProgressMonitor,
        status: &mut MultiStatus,
    ) -> Result<(), ResourceError> {
        for (name, child) in tree.children(from) {
            self.copy_member(tree, &from.append(&name), &to.append(&name), &child, false, plan, monitor, status)?;
        }
        Ok(())
    }

    /// Carry over what a copy keeps from its source.
    fn derive(&self, mut copy: ResourceInfo, source: &ResourceInfo, plan: CopyPlan) -> ResourceInfo {
        let kept = InfoFlags::DERIVED | InfoFlags::TEAM_PRIVATE | InfoFlags::HIDDEN;
        copy.flags |= source.flags & kept;
        copy.charset = source.charset.clone();
        copy.persistent_properties = source.persistent_properties.clone();
        if plan.keep_identity {
            copy.node_id = source.node_id;
            copy.markers = source.markers.clone();
            copy.session_properties = source.session_properties.clone();
        }
        copy
    }

    fn describe_link(
        &self,
        tree: &mut ElementTree,
        path: &ResourcePath,
        kind: ResourceKind,
        location: Option<std::path::PathBuf>,
    ) -> Result<(), ResourceError> {
        let relative = super::project::project_relative(path);
        let kind = match kind {
            ResourceKind::File => LinkKind::File,
            _ => LinkKind::Folder,
        };
        self.update_description(tree, &path.prefix(1), |d| {
            d.links.retain(|l| l.path != relative);
            d.links.push(LinkDescription {
                path: relative,
                kind,
                location,
            });
        })?;
        Ok(())
    }

    /// Copy a whole project to a new project at the default location.
    fn copy_project(
        &self,
        from: &ResourcePath,
        to: &ResourcePath,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), ResourceError> {
        self.run(SchedulingRule::Workspace, false, monitor, |ws| {
            let start = Instant::now();
            let mut tree = ws.write_tree(to)?;
            let info = ws.check_accessible(&tree, from, Some(ResourceKind::Project))?;
            ws.check_absent(&tree, to)?;

            let name = to.project_name().unwrap_or_default().to_string();
            let source = ws.project_location(from.project_name().unwrap_or_default(), &info);
            let target = ws.config.workspace.location.join(&name);
            ws.store.copy_tree(&source, &target)?;

            let mut description = info.description.as_deref().cloned().unwrap_or_default();
            description.name = name.clone();
            description.location = None;
            let disk = ws.store.fetch_info(&target)?;
            let mut copy = ws.local_info(ResourceKind::Project, &disk);
            copy.flags.set(InfoFlags::OPEN, info.is_open());
            copy.charset = info.charset.clone();
            copy.persistent_properties = info.persistent_properties.clone();
            copy.description = Some(Arc::new(description.clone()));
            tree.create(to, copy)?;
            ws.update_description(&mut tree, to, |d| *d = description.clone())?;
            if info.is_open() {
                ws.apply_description(&mut tree, to, &description)?;
                ws.reconcile(&mut tree, to, Depth::Infinite, monitor, start)?;
            }
            ws.invalidate_aliases();
            info!(from = %from, to = %to, "Project copied");
            Ok(())
        })
    }

    /// Destination checks shared by move and copy.
    fn check_target(&self, tree: &ElementTree, destination: &ResourcePath) -> Result<(), ResourceError> {
        self.check_parent(tree, destination)?;
        self.check_absent(tree, destination)?;
        self.check_link_local(tree, destination)
    }
}

fn validate_transfer(
    from: &ResourcePath,
    kind: ResourceKind,
    to: &ResourcePath,
    operation: &'static str,
) -> Result<(), ResourceError> {
    match kind {
        ResourceKind::Root => Err(ResourceError::DerivedRootOrProject {
            path: from.clone(),
            operation,
        }),
        ResourceKind::Project if to.segment_count() != 1 => {
            Err(ResourceError::invalid(to, "a project can only become another project"))
        }
        ResourceKind::File | ResourceKind::Folder if to.segment_count() < 2 => {
            Err(ResourceError::invalid(to, "destination must be inside a project"))
        }
        _ if from.is_prefix_of(to) => Err(ResourceError::invalid(
            to,
            format!("cannot {} {} into itself", operation, from),
        )),
        _ => Ok(()),
    }
}
