//! Resource filter management

use super::project::project_relative;
use super::Workspace;
use crate::description::FilterEntry;
use crate::error::ResourceError;
use crate::filter::{FilterDescription, FilterSet, FilterType, MatcherDescription};
use crate::monitor::ProgressMonitor;
use crate::resource::{Container, ResourceHandle};
use crate::rules::SchedulingRule;
use crate::tree::path::ResourcePath;
use crate::types::Depth;
use std::time::Instant;
use tracing::info;

impl Workspace {
    /// Attach a filter to `container` and refresh it so the namespace
    /// reflects the new filter set. Returns the filter id.
    ///
    /// A filter equal in type and matcher to one already on the container
    /// changes nothing and returns the existing id. If the refresh fails
    /// or is canceled, the filter is not attached.
    pub fn create_filter<C: Container + ?Sized>(
        &self,
        container: &C,
        filter_type: FilterType,
        matcher: MatcherDescription,
        monitor: &dyn ProgressMonitor,
    ) -> Result<u64, ResourceError> {
        let path = container.path().clone();
        if path.is_root() {
            return Err(ResourceError::DerivedRootOrProject {
                path,
                operation: "create a filter on",
            });
        }
        self.run(SchedulingRule::for_path(&path), false, monitor, |ws| {
            let start = Instant::now();
            let mut tree = ws.write_tree(&path)?;
            let info = ws.check_accessible(&tree, &path, None)?;
            if !info.kind.is_container() {
                return Err(ResourceError::invalid(&path, "filters can only be attached to containers"));
            }
            if let Some(existing) = info
                .filters
                .iter()
                .find(|f| f.filter_type() == filter_type && *f.matcher() == matcher)
            {
                return Ok(existing.id());
            }
            let filter = FilterDescription::new(ws.next_filter_id(), filter_type, matcher.clone())
                .map_err(|reason| ResourceError::invalid(&path, reason))?;
            let id = filter.id();
            let entry = FilterEntry::from_filter(project_relative(&path), &filter);
            ws.rollback_on_error(&mut tree, &path.prefix(1), |tree| {
                tree.update(&path, |info| info.filters.push(filter))?;
                ws.update_description(tree, &path.prefix(1), |d| d.filters.push(entry))?;
                ws.reconcile(tree, &path, Depth::Infinite, monitor, start)
            })?;
            info!(container = %path, filter = id, "Filter created");
            Ok(id)
        })
    }

    /// Detach filter `id` from `container`. Unknown ids are ignored.
    pub fn remove_filter<C: Container + ?Sized>(
        &self,
        container: &C,
        id: u64,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), ResourceError> {
        let path = container.path().clone();
        self.run(SchedulingRule::for_path(&path), false, monitor, |ws| {
            let start = Instant::now();
            let mut tree = ws.write_tree(&path)?;
            let info = ws.check_accessible(&tree, &path, None)?;
            if !info.filters.iter().any(|f| f.id() == id) {
                return Ok(());
            }
            let relative = project_relative(&path);
            ws.rollback_on_error(&mut tree, &path.prefix(1), |tree| {
                tree.update(&path, |info| info.filters.retain(|f| f.id() != id))?;
                ws.update_description(tree, &path.prefix(1), |d| {
                    d.filters.retain(|entry| !(entry.id == id && entry.path == relative))
                })?;
                ws.reconcile(tree, &path, Depth::Infinite, monitor, start)
            })?;
            info!(container = %path, filter = id, "Filter removed");
            Ok(())
        })
    }

    /// Filters attached directly to `container`.
    pub fn filters<C: Container + ?Sized>(&self, container: &C) -> Result<Vec<FilterDescription>, ResourceError> {
        let tree = self.tree.read();
        Ok(self.check_accessible(&tree, container.path(), None)?.filters.clone())
    }

    /// Whether a local entry at `path` would be hidden by the filters of
    /// its container and their inheritable ancestors.
    pub fn is_filtered(&self, path: &ResourcePath, is_folder: bool) -> bool {
        let (Some(parent), Some(name)) = (path.parent(), path.last_segment()) else {
            return false;
        };
        if parent.is_root() {
            return false;
        }
        let tree = self.tree.read();
        !FilterSet::for_container(&tree, &parent).is_visible(name, is_folder)
    }
}
