//! Markers: typed, attributed annotations attached to resources.

use crate::tree::path::ResourcePath;
use crate::types::MarkerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub mod types {
    pub const MARKER: &str = "canopy.marker";
    pub const PROBLEM: &str = "canopy.problem";
    pub const TASK: &str = "canopy.task";
    pub const BOOKMARK: &str = "canopy.bookmark";
    pub const TEXT: &str = "canopy.text";
}

pub mod attributes {
    pub const SEVERITY: &str = "severity";
    pub const MESSAGE: &str = "message";
    pub const LINE_NUMBER: &str = "line_number";
    pub const CHAR_START: &str = "char_start";
    pub const CHAR_END: &str = "char_end";
    pub const PRIORITY: &str = "priority";
    pub const DONE: &str = "done";
    /// Markers with this attribute set to true are not written by `save_records`.
    pub const TRANSIENT: &str = "transient";
}

pub const SEVERITY_INFO: i64 = 0;
pub const SEVERITY_WARNING: i64 = 1;
pub const SEVERITY_ERROR: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl From<&str> for MarkerValue {
    fn from(value: &str) -> Self {
        MarkerValue::String(value.to_string())
    }
}

impl From<String> for MarkerValue {
    fn from(value: String) -> Self {
        MarkerValue::String(value)
    }
}

impl From<i64> for MarkerValue {
    fn from(value: i64) -> Self {
        MarkerValue::Integer(value)
    }
}

impl From<bool> for MarkerValue {
    fn from(value: bool) -> Self {
        MarkerValue::Boolean(value)
    }
}

pub type MarkerAttributes = BTreeMap<String, MarkerValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerInfo {
    pub id: MarkerId,
    pub marker_type: String,
    pub attributes: MarkerAttributes,
    /// Milliseconds since the epoch.
    pub creation_time: i64,
}

impl MarkerInfo {
    pub fn attribute(&self, name: &str) -> Option<&MarkerValue> {
        self.attributes.get(name)
    }

    pub fn int_attribute(&self, name: &str, default: i64) -> i64 {
        match self.attributes.get(name) {
            Some(MarkerValue::Integer(v)) => *v,
            _ => default,
        }
    }

    pub fn string_attribute(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name) {
            Some(MarkerValue::String(v)) => Some(v),
            _ => None,
        }
    }

    pub fn bool_attribute(&self, name: &str, default: bool) -> bool {
        match self.attributes.get(name) {
            Some(MarkerValue::Boolean(v)) => *v,
            _ => default,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.bool_attribute(attributes::TRANSIENT, false)
    }
}

/// Markers on a single resource, keyed by id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarkerSet {
    markers: BTreeMap<MarkerId, MarkerInfo>,
}

impl MarkerSet {
    pub fn insert(&mut self, marker: MarkerInfo) {
        self.markers.insert(marker.id, marker);
    }

    pub fn remove(&mut self, id: MarkerId) -> Option<MarkerInfo> {
        self.markers.remove(&id)
    }

    pub fn get(&self, id: MarkerId) -> Option<&MarkerInfo> {
        self.markers.get(&id)
    }

    pub fn get_mut(&mut self, id: MarkerId) -> Option<&mut MarkerInfo> {
        self.markers.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarkerInfo> {
        self.markers.values()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerDeltaKind {
    Added,
    Removed,
    Changed,
}

/// A change to one marker between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerDelta {
    pub kind: MarkerDeltaKind,
    pub id: MarkerId,
    pub marker_type: String,
    pub path: ResourcePath,
    /// Attributes before the change; `None` for additions.
    pub old_attributes: Option<MarkerAttributes>,
    /// Attributes after the change; for removals, the last known ones.
    pub attributes: MarkerAttributes,
}

/// Marker changes between two marker sets of the same resource.
pub fn diff_markers(
    path: &ResourcePath,
    old: Option<&MarkerSet>,
    new: Option<&MarkerSet>,
) -> Vec<MarkerDelta> {
    let empty = MarkerSet::default();
    let old = old.unwrap_or(&empty);
    let new = new.unwrap_or(&empty);
    let mut deltas = Vec::new();

    for marker in old.iter() {
        match new.get(marker.id) {
            None => deltas.push(MarkerDelta {
                kind: MarkerDeltaKind::Removed,
                id: marker.id,
                marker_type: marker.marker_type.clone(),
                path: path.clone(),
                old_attributes: Some(marker.attributes.clone()),
                attributes: marker.attributes.clone(),
            }),
            Some(current) if current != marker => deltas.push(MarkerDelta {
                kind: MarkerDeltaKind::Changed,
                id: marker.id,
                marker_type: current.marker_type.clone(),
                path: path.clone(),
                old_attributes: Some(marker.attributes.clone()),
                attributes: current.attributes.clone(),
            }),
            Some(_) => {}
        }
    }
    for marker in new.iter() {
        if old.get(marker.id).is_none() {
            deltas.push(MarkerDelta {
                kind: MarkerDeltaKind::Added,
                id: marker.id,
                marker_type: marker.marker_type.clone(),
                path: path.clone(),
                old_attributes: None,
                attributes: marker.attributes.clone(),
            });
        }
    }
    deltas.sort_by_key(|d| d.id);
    deltas
}

/// Combine marker deltas of two consecutive intervals.
pub fn merge_marker_deltas(first: &[MarkerDelta], second: &[MarkerDelta]) -> Vec<MarkerDelta> {
    let mut merged: BTreeMap<MarkerId, MarkerDelta> =
        first.iter().map(|d| (d.id, d.clone())).collect();
    for later in second {
        let combined = match merged.remove(&later.id) {
            None => Some(later.clone()),
            Some(earlier) => match (earlier.kind, later.kind) {
                (MarkerDeltaKind::Added, MarkerDeltaKind::Removed) => None,
                (MarkerDeltaKind::Added, _) => Some(MarkerDelta {
                    kind: MarkerDeltaKind::Added,
                    old_attributes: None,
                    ..later.clone()
                }),
                (MarkerDeltaKind::Removed, MarkerDeltaKind::Added) => Some(MarkerDelta {
                    kind: MarkerDeltaKind::Changed,
                    old_attributes: earlier.old_attributes.clone(),
                    ..later.clone()
                }),
                (_, kind) => Some(MarkerDelta {
                    kind,
                    old_attributes: earlier.old_attributes.clone(),
                    ..later.clone()
                }),
            },
        };
        if let Some(delta) = combined {
            merged.insert(delta.id, delta);
        }
    }
    merged.into_values().collect()
}

/// Marker type hierarchy.
#[derive(Debug, Clone)]
pub struct MarkerTypeRegistry {
    supertypes: HashMap<String, Vec<String>>,
}

impl Default for MarkerTypeRegistry {
    fn default() -> Self {
        let mut registry = Self {
            supertypes: HashMap::new(),
        };
        registry.register(types::MARKER, &[]);
        registry.register(types::PROBLEM, &[types::MARKER]);
        registry.register(types::TASK, &[types::MARKER]);
        registry.register(types::BOOKMARK, &[types::MARKER]);
        registry.register(types::TEXT, &[types::MARKER]);
        registry
    }
}

impl MarkerTypeRegistry {
    pub fn register(&mut self, marker_type: &str, supertypes: &[&str]) {
        self.supertypes.insert(
            marker_type.to_string(),
            supertypes.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// True if `candidate` is `ancestor` or inherits from it.
    pub fn is_subtype(&self, candidate: &str, ancestor: &str) -> bool {
        let mut pending = vec![candidate];
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(parents) = self.supertypes.get(current) {
                pending.extend(parents.iter().map(String::as_str));
            }
        }
        false
    }

    pub fn matches(&self, candidate: &str, wanted: Option<&str>, include_subtypes: bool) -> bool {
        match wanted {
            None => true,
            Some(wanted) if include_subtypes => self.is_subtype(candidate, wanted),
            Some(wanted) => candidate == wanted,
        }
    }
}
