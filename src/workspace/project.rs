//! Project lifecycle and descriptions
//!
//! A project's description is the persisted source of its links,
//! virtual folders, filters and charsets. Every change to those is
//! written back to the description file, and opening a project applies
//! the file again before refreshing.

use super::Workspace;
use crate::description::{FilterEntry, LinkKind, ProjectDescription};
use crate::error::{MultiStatus, ResourceError};
use crate::events::EventPhase;
use crate::filter::FilterDescription;
use crate::monitor::{NullMonitor, ProgressMonitor};
use crate::refresh::Refresher;
use crate::resource::{Project, Resource, ResourceHandle, UpdateFlags};
use crate::rules::SchedulingRule;
use crate::tree::element::{ElementTree, Visit};
use crate::tree::info::InfoFlags;
use crate::tree::path::ResourcePath;
use crate::types::{Depth, ResourceKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Project-relative form of `path` used in descriptions.
pub(crate) fn project_relative(path: &ResourcePath) -> String {
    path.segments().get(1..).unwrap_or_default().join("/")
}

fn is_under(entry: &str, relative: &str) -> bool {
    relative.is_empty() || entry == relative || entry.starts_with(&format!("{}/", relative))
}

fn resolve_relative(project: &ResourcePath, relative: &str) -> Result<ResourcePath, ResourceError> {
    if relative.is_empty() {
        return Ok(project.clone());
    }
    let rest = ResourcePath::from_segments(relative.split('/'))?;
    Ok(project.join_segments(rest.segments()))
}

impl Workspace {
    /// Create a closed project.
    ///
    /// Without a description, one already present at the project's
    /// location is adopted; otherwise an empty one is written.
    pub fn create_project(
        &self,
        project: &Project,
        description: Option<ProjectDescription>,
    ) -> Result<(), ResourceError> {
        let path = project.path().clone();
        let name = project.name().to_string();
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            ws.check_absent(&tree, &path)?;

            let mut description = match description {
                Some(description) => description,
                None => ws.read_description(&path, ProjectDescription::new(&name))?,
            };
            description.name = name.clone();
            description.validate(&path)?;
            ws.natures.read().validate(&path, &description.natures)?;

            let location = description
                .location
                .clone()
                .unwrap_or_else(|| ws.config.workspace.location.join(&name));
            ws.store.mkdir(&location, true)?;
            let disk = ws.store.fetch_info(&location)?;
            let mut info = ws.local_info(ResourceKind::Project, &disk);
            info.description = Some(Arc::new(description.clone()));
            tree.create(&path, info)?;
            ws.write_description(&mut tree, &path, &description)?;
            info!(project = %name, location = %location.display(), "Project created");
            Ok(())
        })
    }

    /// Open a project: re-read its description, restore links, filters
    /// and charsets from it and refresh its contents.
    pub fn open_project(&self, project: &Project, monitor: &dyn ProgressMonitor) -> Result<(), ResourceError> {
        let path = project.path().clone();
        self.run(SchedulingRule::for_path(&path), false, monitor, |ws| {
            let start = Instant::now();
            let mut tree = ws.write_tree(&path)?;
            let info = ws.check_accessible(&tree, &path, Some(ResourceKind::Project))?;
            if info.is_open() {
                return Ok(());
            }
            let fallback = info
                .description
                .as_deref()
                .cloned()
                .unwrap_or_else(|| ProjectDescription::new(project.name()));
            let mut description = ws.read_description(&path, fallback)?;
            description.name = project.name().to_string();
            description.validate(&path)?;
            ws.natures.read().validate(&path, &description.natures)?;

            let charset = description.encodings.get("").cloned();
            tree.update(&path, |info| {
                info.flags.insert(InfoFlags::OPEN);
                info.charset = charset;
                info.description = Some(Arc::new(description.clone()));
            })?;
            ws.invalidate_aliases();
            ws.apply_description(&mut tree, &path, &description)?;
            ws.reconcile(&mut tree, &path, Depth::Infinite, monitor, start)?;
            // filters of folders that only appeared during the refresh
            if ws.apply_description(&mut tree, &path, &description)? {
                ws.reconcile(&mut tree, &path, Depth::Infinite, monitor, start)?;
            }
            info!(
                project = project.name(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Project opened"
            );
            Ok(())
        })
    }

    /// Close a project. Its members stay in the tree but become
    /// invisible until it is opened again.
    pub fn close_project(&self, project: &Project, monitor: &dyn ProgressMonitor) -> Result<(), ResourceError> {
        let path = project.path().clone();
        self.run(SchedulingRule::for_path(&path), false, monitor, |ws| {
            let open = ws
                .check_accessible(&ws.tree.read(), &path, Some(ResourceKind::Project))?
                .is_open();
            if !open {
                return Ok(());
            }
            ws.fire_resource_event(EventPhase::PreClose, &Resource::Project(project.clone()));
            let mut tree = ws.write_tree(&path)?;
            tree.update(&path, |info| info.flags.remove(InfoFlags::OPEN))?;
            ws.invalidate_aliases();
            info!(project = project.name(), "Project closed");
            Ok(())
        })
    }

    /// Delete a project. Its content is deleted when `ALWAYS_DELETE_PROJECT_CONTENT`
    /// is given, or when the project is open and `NEVER_DELETE_PROJECT_CONTENT`
    /// is not. No phantom survives.
    pub fn delete_project(
        &self,
        path: &ResourcePath,
        flags: UpdateFlags,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), ResourceError> {
        let project = Project::new(path.clone())?;
        self.run(SchedulingRule::for_path(path), false, monitor, |ws| {
            let info = ws.check_accessible(&ws.tree.read(), path, Some(ResourceKind::Project))?;
            ws.fire_resource_event(EventPhase::PreDelete, &Resource::Project(project.clone()));
            let mut tree = ws.write_tree(path)?;

            let delete_content = flags.contains(UpdateFlags::ALWAYS_DELETE_PROJECT_CONTENT)
                || (info.is_open() && !flags.contains(UpdateFlags::NEVER_DELETE_PROJECT_CONTENT));
            if delete_content {
                if info.is_open() && !flags.contains(UpdateFlags::FORCE) {
                    ws.check_synchronized(&tree, path)?;
                }
                let mut status = MultiStatus::new(format!("Problems encountered while deleting {}", path));
                ws.delete_local(&tree, path, &info, monitor, &mut status)?;
                status.into_result()?;
            }

            tree.remove(path)?;
            ws.invalidate_aliases();
            ws.history.lock().retain(|p, _| !path.is_prefix_of(p));
            info!(project = project.name(), content_deleted = delete_content, "Project deleted");
            Ok(())
        })
    }

    /// Copy of the project's current description.
    pub fn description(&self, project: &Project) -> Result<ProjectDescription, ResourceError> {
        let tree = self.tree.read();
        let info = self.check_accessible(&tree, project.path(), Some(ResourceKind::Project))?;
        Ok(info
            .description
            .as_deref()
            .cloned()
            .unwrap_or_else(|| ProjectDescription::new(project.name())))
    }

    /// Replace a project's description. On an open project, links,
    /// virtual folders, filters and charsets are brought in line with it.
    pub fn set_description(&self, project: &Project, description: ProjectDescription) -> Result<(), ResourceError> {
        let path = project.path().clone();
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            let info = ws.check_accessible(&tree, &path, Some(ResourceKind::Project))?;
            let mut description = description;
            description.name = project.name().to_string();
            description.validate(&path)?;
            ws.natures.read().validate(&path, &description.natures)?;

            if !ws.update_description(&mut tree, &path, |d| *d = description.clone())? || !info.is_open() {
                return Ok(());
            }
            let charset = description.encodings.get("").cloned();
            tree.update(&path, |info| info.charset = charset)?;
            ws.drop_undescribed_links(&mut tree, &path, &description)?;
            if ws.apply_description(&mut tree, &path, &description)? {
                ws.reconcile(&mut tree, &path, Depth::Infinite, &NullMonitor, Instant::now())?;
            }
            debug!(project = project.name(), "Project description replaced");
            Ok(())
        })
    }

    /// Projects named in the description's references.
    pub fn referenced_projects(&self, project: &Project) -> Result<Vec<Project>, ResourceError> {
        let description = self.description(project)?;
        description
            .references
            .iter()
            .map(|name| self.root().project(name))
            .collect()
    }

    /// Read the description file of `project`, or `fallback` when there
    /// is none.
    fn read_description(
        &self,
        project: &ResourcePath,
        fallback: ProjectDescription,
    ) -> Result<ProjectDescription, ResourceError> {
        let name = project.project_name().unwrap_or_default();
        let location = fallback
            .location
            .clone()
            .unwrap_or_else(|| self.config.workspace.location.join(name))
            .join(&self.config.workspace.description_file);
        let disk = self.store.fetch_info(&location)?;
        if !disk.exists || disk.is_directory {
            return Ok(fallback);
        }
        let bytes = self.store.read(&location)?;
        let text = String::from_utf8_lossy(&bytes);
        let mut description = ProjectDescription::from_toml(project, &text)?;
        if description.location.is_none() {
            description.location = fallback.location;
        }
        Ok(description)
    }

    /// Apply `edit` to the project's description and write it out if it
    /// changed. Returns whether it changed.
    pub(crate) fn update_description<F>(
        &self,
        tree: &mut ElementTree,
        project: &ResourcePath,
        edit: F,
    ) -> Result<bool, ResourceError>
    where
        F: FnOnce(&mut ProjectDescription),
    {
        let info = tree
            .info(project)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(project.clone()))?;
        let current = info
            .description
            .as_deref()
            .cloned()
            .unwrap_or_else(|| ProjectDescription::new(project.project_name().unwrap_or_default()));
        let mut updated = current.clone();
        edit(&mut updated);
        if updated == current {
            return Ok(false);
        }
        self.write_description(tree, project, &updated)?;
        Ok(true)
    }

    /// Store `description` on the project and in its description file.
    fn write_description(
        &self,
        tree: &mut ElementTree,
        project: &ResourcePath,
        description: &ProjectDescription,
    ) -> Result<(), ResourceError> {
        let info = tree
            .info(project)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(project.clone()))?;
        let name = project.project_name().unwrap_or_default();
        let location = self.project_location(name, &info);
        if !self.store.fetch_info(&location)?.exists {
            self.store.mkdir(&location, true)?;
        }
        let file = &self.config.workspace.description_file;
        self.store.write(&location.join(file), description.to_toml()?.as_bytes())?;
        let stored = Arc::new(description.clone());
        tree.update(project, |info| info.description = Some(stored))?;

        if info.is_open() {
            let mut refresher = Refresher::new(self, &NullMonitor);
            refresher.sync_member(tree, project, file, Depth::Zero)?;
            refresher.finish()?;
        }
        debug!(project = %project, "Project description written");
        Ok(())
    }

    /// Run `edit` against the tree. If it fails, the tree goes back to
    /// its state before the call and the description file of `project`
    /// is rewritten to match it.
    pub(crate) fn rollback_on_error<T, F>(
        &self,
        tree: &mut ElementTree,
        project: &ResourcePath,
        edit: F,
    ) -> Result<T, ResourceError>
    where
        F: FnOnce(&mut ElementTree) -> Result<T, ResourceError>,
    {
        let checkpoint = tree.snapshot();
        let outcome = edit(tree);
        if let Err(err) = &outcome {
            let written = tree.info(project).and_then(|i| i.description.clone());
            let original = tree
                .info_in(checkpoint.root(), project)
                .and_then(|i| i.description.clone());
            tree.restore(&checkpoint);
            self.invalidate_aliases();
            debug!(project = %project, error = %err, "Partial change rolled back");
            if written != original {
                if let Err(restore_err) = self.restore_description_file(tree, project, original.as_deref()) {
                    warn!(project = %project, error = %restore_err, "Could not restore description file");
                }
            }
        }
        tree.release(checkpoint);
        outcome
    }

    /// Put the description file back to `original` and record its new
    /// local state without reporting a content change.
    fn restore_description_file(
        &self,
        tree: &mut ElementTree,
        project: &ResourcePath,
        original: Option<&ProjectDescription>,
    ) -> Result<(), ResourceError> {
        let Some(info) = tree.info(project).cloned() else {
            return Ok(());
        };
        let file = &self.config.workspace.description_file;
        let location = self
            .project_location(project.project_name().unwrap_or_default(), &info)
            .join(file);
        match original {
            Some(description) => self.store.write(&location, description.to_toml()?.as_bytes())?,
            None => self.store.delete(&location)?,
        }
        let member = project.append(file);
        if tree.info(&member).is_some() {
            let disk = self.store.fetch_info(&location)?;
            if disk.exists {
                tree.update(&member, |info| info.local = Some(disk.local_state()))?;
            }
        }
        Ok(())
    }

    /// Materialize the links and virtual folders of `description` and set
    /// the filters and charsets it records. Returns whether any
    /// container's filters changed.
    pub(crate) fn apply_description(
        &self,
        tree: &mut ElementTree,
        project: &ResourcePath,
        description: &ProjectDescription,
    ) -> Result<bool, ResourceError> {
        let mut links = description.links.clone();
        links.sort_by_key(|link| link.path.matches('/').count());
        for link in links {
            let path = match resolve_relative(project, &link.path) {
                Ok(path) if path.segment_count() > 1 => path,
                _ => {
                    warn!(project = %project, link = %link.path, "Ignoring link with an invalid path");
                    continue;
                }
            };
            if tree.info(&path).map_or(false, |i| !i.is_phantom()) {
                continue;
            }
            let parent_live = path
                .parent()
                .and_then(|p| tree.info(&p).cloned())
                .map_or(false, |i| !i.is_phantom() && i.kind.is_container());
            if !parent_live {
                debug!(link = %path, "Parent of described link is missing");
                continue;
            }
            let info = match (&link.location, link.kind) {
                (Some(target), kind) => self.link_info(&path, kind.resource_kind(), target)?,
                (None, LinkKind::Folder) => self.virtual_info(),
                (None, LinkKind::File) => continue,
            };
            self.place(tree, &path, info)?;
        }
        self.invalidate_aliases();

        let mut wanted: BTreeMap<ResourcePath, Vec<FilterDescription>> = BTreeMap::new();
        for entry in &description.filters {
            let filter = entry
                .to_filter()
                .map_err(|reason| ResourceError::invalid(project, reason))?;
            match resolve_relative(project, &entry.path) {
                Ok(path) => wanted.entry(path).or_default().push(filter),
                Err(err) => warn!(error = %err, "Ignoring filter with an invalid path"),
            }
        }
        let mut current = Vec::new();
        tree.walk(project, |path, info| {
            if info.is_phantom() || info.kind == ResourceKind::File {
                return Ok(Visit::SkipChildren);
            }
            if !info.filters.is_empty() || wanted.contains_key(path) {
                current.push((path.clone(), info.filters.clone()));
            }
            Ok(Visit::Continue)
        })?;
        let mut filters_changed = false;
        for (path, filters) in current {
            let target = wanted.get(&path).cloned().unwrap_or_default();
            if filters != target {
                tree.update(&path, |info| info.filters = target)?;
                filters_changed = true;
            }
        }

        for (relative, charset) in &description.encodings {
            let Ok(path) = resolve_relative(project, relative) else {
                continue;
            };
            let differs = tree
                .info(&path)
                .map_or(false, |i| !i.is_phantom() && i.charset.as_deref() != Some(charset.as_str()));
            if differs {
                let charset = charset.clone();
                tree.update(&path, |info| info.charset = Some(charset))?;
            }
        }
        Ok(filters_changed)
    }

    /// Remove links and virtual folders the description no longer lists.
    fn drop_undescribed_links(
        &self,
        tree: &mut ElementTree,
        project: &ResourcePath,
        description: &ProjectDescription,
    ) -> Result<(), ResourceError> {
        let mut stale = Vec::new();
        tree.walk(project, |path, info| {
            if info.is_phantom() || info.kind == ResourceKind::File && !info.is_link() {
                return Ok(Visit::SkipChildren);
            }
            if (info.is_link() || info.is_virtual())
                && !description.links.iter().any(|l| l.path == project_relative(path))
            {
                stale.push(path.clone());
                return Ok(Visit::SkipChildren);
            }
            Ok(Visit::Continue)
        })?;
        for path in stale {
            debug!(path = %path, "Removing link dropped from the description");
            self.remove_subtree(tree, &path, super::PhantomPolicy::Retain)?;
        }
        if !description.links.is_empty() {
            self.invalidate_aliases();
        }
        Ok(())
    }

    /// Drop description entries recorded at or below `path`.
    pub(crate) fn forget_description_entries(
        &self,
        tree: &mut ElementTree,
        path: &ResourcePath,
    ) -> Result<(), ResourceError> {
        if path.segment_count() < 2 {
            return Ok(());
        }
        let relative = project_relative(path);
        self.update_description(tree, &path.prefix(1), |d| {
            d.links.retain(|l| !is_under(&l.path, &relative));
            d.filters.retain(|f| !is_under(&f.path, &relative));
            d.encodings.retain(|k, _| !is_under(k, &relative));
        })?;
        Ok(())
    }

    /// Carry description entries at or below `from` over to `to`. Both
    /// may be in different projects.
    pub(crate) fn rebase_description_entries(
        &self,
        tree: &mut ElementTree,
        from: &ResourcePath,
        to: &ResourcePath,
        keep_links: bool,
    ) -> Result<(), ResourceError> {
        let source_project = from.prefix(1);
        let Some(source) = tree.info(&source_project).and_then(|i| i.description.clone()) else {
            return Ok(());
        };
        let from_rel = project_relative(from);
        let to_rel = project_relative(to);
        let rebase = |entry: &str| format!("{}{}", to_rel, &entry[from_rel.len()..]);

        let mut links = Vec::new();
        if keep_links {
            for link in source.links.iter().filter(|l| is_under(&l.path, &from_rel)) {
                let mut moved = link.clone();
                moved.path = rebase(&link.path);
                links.push(moved);
            }
        }
        let filters: Vec<FilterEntry> = source
            .filters
            .iter()
            .filter(|f| is_under(&f.path, &from_rel))
            .map(|f| FilterEntry {
                path: rebase(&f.path),
                ..f.clone()
            })
            .collect();
        let encodings: Vec<(String, String)> = source
            .encodings
            .iter()
            .filter(|(k, _)| is_under(k, &from_rel))
            .map(|(k, v)| (rebase(k), v.clone()))
            .collect();

        self.forget_description_entries(tree, from)?;
        if links.is_empty() && filters.is_empty() && encodings.is_empty() {
            return Ok(());
        }
        self.update_description(tree, &to.prefix(1), |d| {
            d.links.retain(|l| !is_under(&l.path, &to_rel));
            d.links.extend(links);
            d.filters.retain(|f| !is_under(&f.path, &to_rel));
            d.filters.extend(filters);
            d.encodings.extend(encodings);
        })?;
        Ok(())
    }
}
