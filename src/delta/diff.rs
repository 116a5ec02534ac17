//! Structural diff of two tree versions
//!
//! Subtrees whose root slots are identical in both versions are skipped
//! without being visited, unless the charset they inherit differs, in
//! which case the walk continues so files whose effective charset
//! changed can be flagged.

use crate::delta::{DeltaFlags, DeltaKind, ResourceDelta};
use crate::markers::diff_markers;
use crate::tree::arena::SlotId;
use crate::tree::element::ElementTree;
use crate::tree::info::{ResourceInfo, SyncTable};
use crate::tree::path::ResourcePath;
use crate::types::{NodeId, ResourceKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, instrument};

/// Values the diff needs from outside the tree.
#[derive(Debug, Clone, Copy)]
pub struct DiffContext<'a> {
    /// Charset inherited by the workspace root.
    pub default_charset: &'a str,
}

/// Delta between two versions, or `None` when nothing changed.
#[instrument(skip_all, fields(old = ?old_root, new = ?new_root))]
pub fn compute_delta(
    tree: &ElementTree,
    old_root: SlotId,
    new_root: SlotId,
    context: &DiffContext<'_>,
) -> Option<ResourceDelta> {
    let start = Instant::now();
    let mut differ = Differ {
        tree,
        added: HashMap::new(),
        removed: HashMap::new(),
    };
    let inherited = Inherited {
        old: Some(context.default_charset),
        new: Some(context.default_charset),
    };
    let mut delta = differ.diff(&ResourcePath::root(), Some(old_root), Some(new_root), inherited)?;
    let Differ { added, removed, .. } = differ;
    pair_moves(&mut delta, added, removed);

    debug!(
        nodes = delta.node_count(),
        duration_us = start.elapsed().as_micros() as u64,
        "Computed resource delta"
    );
    Some(delta)
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct Inherited<'a> {
    old: Option<&'a str>,
    new: Option<&'a str>,
}

struct Differ<'a> {
    tree: &'a ElementTree,
    added: HashMap<NodeId, ResourcePath>,
    removed: HashMap<NodeId, ResourcePath>,
}

impl<'a> Differ<'a> {
    fn diff(
        &mut self,
        path: &ResourcePath,
        old: Option<SlotId>,
        new: Option<SlotId>,
        inherited: Inherited<'a>,
    ) -> Option<ResourceDelta> {
        if old == new && inherited.old == inherited.new {
            return None;
        }
        let tree: &'a ElementTree = self.tree;
        let old_node = old.and_then(|id| tree.node(id));
        let new_node = new.and_then(|id| tree.node(id));
        let old_info: Option<&'a ResourceInfo> = old_node.map(|n| n.info.as_ref());
        let new_info: Option<&'a ResourceInfo> = new_node.map(|n| n.info.as_ref());

        let resource_kind = new_info.or(old_info)?.kind;
        let (kind, phantom) = classify(old_info, new_info);
        let mut delta = ResourceDelta::new(path.clone(), resource_kind, kind);
        delta.phantom = phantom;
        delta.old_node = old_info.filter(|i| !i.is_phantom()).map(|i| i.node_id);
        delta.new_node = new_info.filter(|i| !i.is_phantom()).map(|i| i.node_id);

        if let (Some(o), Some(n)) = (old_info, new_info) {
            delta.flags = if phantom {
                if sync_table(o) != sync_table(n) {
                    DeltaFlags::SYNC
                } else {
                    DeltaFlags::empty()
                }
            } else if kind == DeltaKind::Changed {
                compare(o, n, inherited)
            } else {
                DeltaFlags::empty()
            };
        }

        let old_markers = old_info.and_then(|i| i.visible_markers());
        let new_markers = new_info.and_then(|i| i.visible_markers());
        if old_markers != new_markers {
            delta.marker_deltas = diff_markers(path, old_markers, new_markers);
            if !delta.marker_deltas.is_empty() && kind == DeltaKind::Changed {
                delta.flags |= DeltaFlags::MARKERS;
            }
        }

        // Children of closed projects are not part of the delta, nor are
        // those of a project whose open state flipped.
        let old_exposes = old_info.map_or(false, |i| i.exposes_children());
        let new_exposes = new_info.map_or(false, |i| i.exposes_children());
        let open_flipped = resource_kind == ResourceKind::Project
            && old_info.is_some()
            && new_info.is_some()
            && old_exposes != new_exposes;
        let empty = BTreeMap::new();
        let old_children = match old_node {
            Some(node) if old_exposes && !open_flipped => &node.children,
            _ => &empty,
        };
        let new_children = match new_node {
            Some(node) if new_exposes && !open_flipped => &node.children,
            _ => &empty,
        };

        let child_inherited = Inherited {
            old: old_info
                .and_then(|i| i.charset.as_deref())
                .or(inherited.old),
            new: new_info
                .and_then(|i| i.charset.as_deref())
                .or(inherited.new),
        };
        let names: BTreeSet<&String> = old_children.keys().chain(new_children.keys()).collect();
        for name in names {
            let child_path = path.append(name);
            if let Some(child) = self.diff(
                &child_path,
                old_children.get(name).copied(),
                new_children.get(name).copied(),
                child_inherited,
            ) {
                delta.children.push(child);
            }
        }

        match delta.kind {
            DeltaKind::Added => {
                if let Some(id) = delta.new_node {
                    self.added.insert(id, path.clone());
                }
            }
            DeltaKind::Removed => {
                if let Some(id) = delta.old_node {
                    self.removed.insert(id, path.clone());
                }
            }
            DeltaKind::Changed if delta.flags.contains(DeltaFlags::REPLACED) => {
                if let Some(id) = delta.old_node {
                    self.removed.insert(id, path.clone());
                }
                if let Some(id) = delta.new_node {
                    self.added.insert(id, path.clone());
                }
            }
            _ => {}
        }

        if delta.kind == DeltaKind::Changed
            && delta.flags.is_empty()
            && delta.marker_deltas.is_empty()
            && delta.children.is_empty()
        {
            return None;
        }
        Some(delta)
    }
}

fn classify(old: Option<&ResourceInfo>, new: Option<&ResourceInfo>) -> (DeltaKind, bool) {
    match (old, new) {
        (None, None) => (DeltaKind::NoChange, false),
        (None, Some(n)) if n.is_phantom() => (DeltaKind::AddedPhantom, false),
        (None, Some(_)) => (DeltaKind::Added, false),
        (Some(o), None) if o.is_phantom() => (DeltaKind::RemovedPhantom, false),
        (Some(_), None) => (DeltaKind::Removed, false),
        (Some(o), Some(n)) => match (o.is_phantom(), n.is_phantom()) {
            (true, true) => (DeltaKind::Changed, true),
            (true, false) => (DeltaKind::Added, false),
            (false, true) => (DeltaKind::Removed, false),
            (false, false) => (DeltaKind::Changed, false),
        },
    }
}

fn sync_table(info: &ResourceInfo) -> Option<&SyncTable> {
    info.sync_info.as_deref().filter(|t| !t.is_empty())
}

fn effective_charset<'a>(info: &'a ResourceInfo, inherited: Option<&'a str>) -> Option<&'a str> {
    info.charset
        .as_deref()
        .or(info.detected_charset.as_deref())
        .or(inherited)
}

/// Flags for a resource present in both versions.
fn compare(old: &ResourceInfo, new: &ResourceInfo, inherited: Inherited<'_>) -> DeltaFlags {
    let mut flags = DeltaFlags::empty();
    if old.kind != new.kind {
        flags |= DeltaFlags::TYPE | DeltaFlags::REPLACED | DeltaFlags::CONTENT;
    } else if old.node_id != new.node_id {
        flags |= DeltaFlags::REPLACED;
        if new.kind == ResourceKind::File {
            flags |= DeltaFlags::CONTENT;
        }
    } else if new.kind == ResourceKind::File && old.content_id != new.content_id {
        flags |= DeltaFlags::CONTENT;
    }
    if new.kind == ResourceKind::Project && old.is_open() != new.is_open() {
        flags |= DeltaFlags::OPEN;
    }
    if sync_table(old) != sync_table(new) {
        flags |= DeltaFlags::SYNC;
    }
    if old.description != new.description {
        flags |= DeltaFlags::DESCRIPTION;
    }
    if old.is_derived() != new.is_derived() {
        flags |= DeltaFlags::DERIVED_CHANGED;
    }
    if old.link_target != new.link_target
        || ((old.is_link() || new.is_link()) && old.local_exists() != new.local_exists())
    {
        flags |= DeltaFlags::LOCAL_CHANGED;
    }
    let encoding_changed = if new.kind == ResourceKind::File {
        effective_charset(old, inherited.old) != effective_charset(new, inherited.new)
    } else {
        old.charset != new.charset
    };
    if encoding_changed {
        flags |= DeltaFlags::ENCODING;
    }
    flags
}

/// Turn removed/added pairs that share a node identity into moves.
fn pair_moves(
    root: &mut ResourceDelta,
    added: HashMap<NodeId, ResourcePath>,
    removed: HashMap<NodeId, ResourcePath>,
) {
    for (id, to) in added {
        let Some(from) = removed.get(&id) else {
            continue;
        };
        if let Some(source) = root.find_member_mut(from) {
            source.flags |= DeltaFlags::MOVED_TO;
            source.moved_to = Some(to.clone());
        }
        if let Some(destination) = root.find_member_mut(&to) {
            destination.flags |= DeltaFlags::MOVED_FROM;
            destination.moved_from = Some(from.clone());
        }
    }
}
