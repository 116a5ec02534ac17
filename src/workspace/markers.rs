//! Marker management

use super::Workspace;
use crate::error::ResourceError;
use crate::markers::{attributes, types, MarkerAttributes, MarkerInfo, MarkerSet, MarkerValue};
use crate::monitor::NullMonitor;
use crate::resource::{Resource, ResourceHandle};
use crate::rules::SchedulingRule;
use crate::tree::element::{ElementTree, Visit};
use crate::tree::info::ResourceInfo;
use crate::tree::path::ResourcePath;
use crate::types::{Depth, MarkerId};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Marker type and depth selection shared by the bulk operations.
struct MarkerQuery<'a> {
    marker_type: Option<&'a str>,
    include_subtypes: bool,
    depth: Depth,
}

impl Workspace {
    pub fn create_marker<R: ResourceHandle + ?Sized>(&self, resource: &R, marker_type: &str) -> Result<MarkerId, ResourceError> {
        self.create_marker_with(resource, marker_type, MarkerAttributes::new())
    }

    /// Attach a new marker with initial attributes.
    pub fn create_marker_with<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        marker_type: &str,
        attributes: MarkerAttributes,
    ) -> Result<MarkerId, ResourceError> {
        let path = resource.path().clone();
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            ws.check_accessible(&tree, &path, None)?;
            let marker = MarkerInfo {
                id: ws.next_marker_id(),
                marker_type: marker_type.to_string(),
                attributes: attributes.clone(),
                creation_time: Utc::now().timestamp_millis(),
            };
            let id = marker.id;
            tree.update(&path, |info| {
                let mut set = info.markers.as_deref().cloned().unwrap_or_default();
                set.insert(marker);
                info.markers = Some(Arc::new(set));
            })?;
            debug!(path = %path, marker = id, marker_type, "Marker created");
            Ok(id)
        })
    }

    /// The marker `id` on `resource`, if it exists.
    pub fn marker<R: ResourceHandle + ?Sized>(&self, resource: &R, id: MarkerId) -> Result<Option<MarkerInfo>, ResourceError> {
        let tree = self.tree.read();
        let info = self.check_accessible(&tree, resource.path(), None)?;
        Ok(info.visible_markers().and_then(|set| set.get(id)).cloned())
    }

    pub fn set_marker_attribute<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        id: MarkerId,
        name: &str,
        value: impl Into<MarkerValue>,
    ) -> Result<(), ResourceError> {
        let mut attributes = MarkerAttributes::new();
        attributes.insert(name.to_string(), value.into());
        self.set_marker_attributes(resource, id, attributes)
    }

    /// Merge `attributes` into the marker's attributes.
    pub fn set_marker_attributes<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        id: MarkerId,
        attributes: MarkerAttributes,
    ) -> Result<(), ResourceError> {
        let path = resource.path().clone();
        self.edit_markers(&path, |set| {
            let marker = set
                .get_mut(id)
                .ok_or_else(|| ResourceError::invalid(&path, format!("marker {} does not exist", id)))?;
            let before = marker.attributes.clone();
            marker.attributes.extend(attributes);
            Ok(marker.attributes != before)
        })
    }

    /// Remove one marker. Returns whether it existed.
    pub fn delete_marker<R: ResourceHandle + ?Sized>(&self, resource: &R, id: MarkerId) -> Result<bool, ResourceError> {
        let path = resource.path().clone();
        let mut removed = false;
        self.edit_markers(&path, |set| {
            removed = set.remove(id).is_some();
            Ok(removed)
        })?;
        Ok(removed)
    }

    fn edit_markers<F>(&self, path: &ResourcePath, edit: F) -> Result<(), ResourceError>
    where
        F: FnOnce(&mut MarkerSet) -> Result<bool, ResourceError>,
    {
        self.run(SchedulingRule::for_path(path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(path)?;
            let info = ws.check_accessible(&tree, path, None)?;
            let mut set = info.markers.as_deref().cloned().unwrap_or_default();
            if !edit(&mut set)? {
                return Ok(());
            }
            tree.update(path, |info| info.markers = (!set.is_empty()).then(|| Arc::new(set)))
        })
    }

    /// Remove the matching markers on `resource` and its members to
    /// `depth`. Returns how many were removed.
    pub fn delete_markers<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        marker_type: Option<&str>,
        include_subtypes: bool,
        depth: Depth,
    ) -> Result<usize, ResourceError> {
        let base = resource.path().clone();
        let query = MarkerQuery {
            marker_type,
            include_subtypes,
            depth,
        };
        self.run(SchedulingRule::for_path(&base), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&base)?;
            ws.check_accessible(&tree, &base, None)?;
            let doomed = ws.collect_markers(&tree, &base, &query)?;
            let mut removed = 0;
            let mut by_path: Vec<(ResourcePath, Vec<MarkerId>)> = Vec::new();
            for (path, marker) in doomed {
                match by_path.last_mut() {
                    Some((last, ids)) if *last == path => ids.push(marker.id),
                    _ => by_path.push((path, vec![marker.id])),
                }
            }
            for (path, ids) in by_path {
                removed += ids.len();
                tree.update(&path, |info| {
                    let mut set = info.markers.as_deref().cloned().unwrap_or_default();
                    for id in &ids {
                        set.remove(*id);
                    }
                    info.markers = (!set.is_empty()).then(|| Arc::new(set));
                })?;
            }
            debug!(base = %base, removed, "Markers deleted");
            Ok(removed)
        })
    }

    /// Matching markers on `resource` and its members to `depth`, in
    /// path order.
    pub fn find_markers<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        marker_type: Option<&str>,
        include_subtypes: bool,
        depth: Depth,
    ) -> Result<Vec<(Resource, MarkerInfo)>, ResourceError> {
        let query = MarkerQuery {
            marker_type,
            include_subtypes,
            depth,
        };
        let tree = self.tree.read();
        self.check_accessible(&tree, resource.path(), None)?;
        let found = self.collect_markers(&tree, resource.path(), &query)?;
        Ok(found
            .into_iter()
            .map(|(path, marker)| {
                let kind = tree.info(&path).map(|i| i.kind).unwrap_or(resource.kind());
                (Resource::from_kind(path, kind), marker)
            })
            .collect())
    }

    /// Highest severity among matching problem markers, or `None` when
    /// there are none.
    pub fn find_max_problem_severity<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        marker_type: Option<&str>,
        include_subtypes: bool,
        depth: Depth,
    ) -> Result<Option<i64>, ResourceError> {
        let marker_type = marker_type.unwrap_or(types::PROBLEM);
        let found = self.find_markers(resource, Some(marker_type), include_subtypes, depth)?;
        let registry = self.marker_types.read();
        Ok(found
            .iter()
            .filter(|(_, marker)| registry.is_subtype(&marker.marker_type, types::PROBLEM))
            .filter_map(|(_, marker)| match marker.attribute(attributes::SEVERITY) {
                Some(MarkerValue::Integer(severity)) => Some(*severity),
                _ => None,
            })
            .max())
    }

    fn collect_markers(
        &self,
        tree: &ElementTree,
        base: &ResourcePath,
        query: &MarkerQuery<'_>,
    ) -> Result<Vec<(ResourcePath, MarkerInfo)>, ResourceError> {
        let registry = self.marker_types.read();
        let mut found = Vec::new();
        tree.walk(base, |path, info| {
            if info.is_phantom() {
                return Ok(Visit::SkipChildren);
            }
            if let Some(set) = info.visible_markers() {
                found.extend(
                    set.iter()
                        .filter(|m| registry.matches(&m.marker_type, query.marker_type, query.include_subtypes))
                        .map(|m| (path.clone(), m.clone())),
                );
            }
            Ok(if descends(query.depth, base, path, info) {
                Visit::Continue
            } else {
                Visit::SkipChildren
            })
        })?;
        Ok(found)
    }
}

fn descends(depth: Depth, base: &ResourcePath, path: &ResourcePath, info: &ResourceInfo) -> bool {
    if !info.exposes_children() {
        return false;
    }
    match depth {
        Depth::Zero => false,
        Depth::One => path == base,
        Depth::Infinite => true,
    }
}
