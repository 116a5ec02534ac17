//! Local locations and aliases
//!
//! A resource's location is found by walking up to the nearest anchor:
//! a link (its target plus the remaining segments), a virtual folder
//! (no location) or the project (its description location, else the
//! workspace location plus the project name).
//!
//! The alias index lists every anchor by canonical location so that a
//! disk change made through one resource can be replayed on every other
//! resource mapped to the same directory.

use crate::error::ResourceError;
use crate::monitor::NullMonitor;
use crate::refresh::Refresher;
use crate::resource::ResourceHandle;
use crate::tree::element::{ElementTree, Visit};
use crate::tree::info::ResourceInfo;
use crate::tree::path::{canonicalize_location, ResourcePath};
use crate::types::{Depth, ResourceKind};
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Anchors (projects and links) of open projects, by canonical location.
#[derive(Debug, Default)]
pub(crate) struct AliasIndex {
    anchors: Vec<(PathBuf, ResourcePath)>,
}

impl AliasIndex {
    fn build(workspace: &Workspace, tree: &ElementTree) -> Self {
        let mut anchors = Vec::new();
        for (name, info) in tree.children(&ResourcePath::root()) {
            if info.is_phantom() || !info.is_open() {
                continue;
            }
            let project = ResourcePath::root().append(&name);
            anchors.push((
                canonicalize_location(&workspace.project_location(&name, &info)),
                project.clone(),
            ));
            let walked = tree.walk(&project, |path, info| {
                if info.is_phantom() || info.kind == ResourceKind::File && !info.is_link() {
                    return Ok(Visit::SkipChildren);
                }
                if let (true, Some(target)) = (info.is_link(), &info.link_target) {
                    anchors.push((canonicalize_location(target), path.clone()));
                }
                Ok(Visit::Continue)
            });
            if let Err(err) = walked {
                debug!(error = %err, project = %project, "Alias scan stopped early");
            }
        }
        trace!(anchors = anchors.len(), "Built alias index");
        Self { anchors }
    }

    /// Every resource path whose location is `location`.
    pub fn resources_at(&self, location: &Path) -> Vec<ResourcePath> {
        let location = canonicalize_location(location);
        let mut found = Vec::new();
        for (anchor, path) in &self.anchors {
            let Ok(rest) = location.strip_prefix(anchor) else {
                continue;
            };
            let segments: Vec<String> = rest
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            if let Ok(alias) = ResourcePath::from_segments(&segments) {
                found.push(path.join_segments(alias.segments()));
            }
        }
        found.sort();
        found.dedup();
        found
    }
}

impl Workspace {
    /// Location of a project given its info.
    pub(crate) fn project_location(&self, name: &str, info: &ResourceInfo) -> PathBuf {
        info.description
            .as_ref()
            .and_then(|d| d.location.clone())
            .unwrap_or_else(|| self.config.workspace.location.join(name))
    }

    /// Location of `path` in `tree`; `None` inside virtual folders.
    pub(crate) fn location_in(&self, tree: &ElementTree, path: &ResourcePath) -> Option<PathBuf> {
        if path.is_root() {
            return Some(self.config.workspace.location.clone());
        }
        for depth in (1..=path.segment_count()).rev() {
            let anchor = path.prefix(depth);
            let Some(info) = tree.info(&anchor) else {
                continue;
            };
            if info.is_phantom() {
                continue;
            }
            let rest = ResourcePath::relative_fs(&path.segments()[depth..]);
            if depth == 1 {
                return Some(self.project_location(&path.segments()[0], info).join(rest));
            }
            if info.is_link() {
                return info.link_target.as_ref().map(|target| target.join(rest));
            }
            if info.is_virtual() {
                return None;
            }
        }
        Some(
            self.config
                .workspace
                .location
                .join(ResourcePath::relative_fs(path.segments())),
        )
    }

    /// Local location of a resource, whether or not it exists.
    /// Resources inside virtual folders have none.
    pub fn location<R: ResourceHandle + ?Sized>(&self, resource: &R) -> Option<PathBuf> {
        let tree = self.tree.read();
        self.location_in(&tree, resource.path())
    }

    /// Link target of a linked resource, as given at creation.
    pub fn raw_location<R: ResourceHandle + ?Sized>(&self, resource: &R) -> Option<PathBuf> {
        let tree = self.tree.read();
        tree.visible_info(resource.path())
            .filter(|i| !i.is_phantom())
            .and_then(|i| i.link_target.clone())
    }

    pub(crate) fn invalidate_aliases(&self) {
        *self.aliases.lock() = None;
    }

    fn alias_index(&self, tree: &ElementTree) -> Arc<AliasIndex> {
        let mut cached = self.aliases.lock();
        if let Some(index) = cached.as_ref() {
            return Arc::clone(index);
        }
        let index = Arc::new(AliasIndex::build(self, tree));
        *cached = Some(Arc::clone(&index));
        index
    }

    /// Every other resource mapped to the same location as `path`.
    pub(crate) fn aliases_of(&self, tree: &ElementTree, path: &ResourcePath) -> Vec<ResourcePath> {
        let Some(location) = self.location_in(tree, path) else {
            return Vec::new();
        };
        self.alias_index(tree)
            .resources_at(&location)
            .into_iter()
            .filter(|alias| alias != path)
            .collect()
    }

    /// Replay a disk change at `path` on every alias of its parent
    /// directory, and on links whose target is `path` itself.
    pub(crate) fn refresh_aliases(&self, tree: &mut ElementTree, path: &ResourcePath) -> Result<(), ResourceError> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let containers = self.aliases_of(tree, &parent);
        let anchors = self.aliases_of(tree, path);
        if containers.is_empty() && anchors.is_empty() {
            return Ok(());
        }
        let mut refresher = Refresher::new(self, &NullMonitor);
        for alias in containers {
            let live = tree
                .visible_info(&alias)
                .map_or(false, |i| !i.is_phantom() && i.exposes_children());
            if live {
                debug!(origin = %path, alias = %alias, "Refreshing alias container");
                refresher.sync_children(tree, &alias, Depth::Zero)?;
            }
        }
        for alias in anchors {
            let is_link = tree.info(&alias).map_or(false, |i| i.is_link() && !i.is_phantom());
            if let (true, Some(alias_parent), Some(name)) = (is_link, alias.parent(), alias.last_segment()) {
                debug!(origin = %path, link = %alias, "Refreshing aliasing link");
                refresher.sync_member(tree, &alias_parent, name, Depth::Zero)?;
            }
        }
        refresher.finish().map(|_| ())
    }
}
