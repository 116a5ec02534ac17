//! Merging deltas of consecutive intervals
//!
//! `merge(a, b)` describes the change from the start of `a` to the end
//! of `b`. Resources added then removed vanish, resources removed then
//! added become replacements, flags accumulate, and move endpoints are
//! carried over from whichever interval recorded them.

use crate::delta::{DeltaFlags, DeltaKind, ResourceDelta};
use crate::markers::merge_marker_deltas;
use crate::types::ResourceKind;
use std::cmp::Ordering;

/// Combine two deltas rooted at the same path.
pub fn merge(first: &ResourceDelta, second: &ResourceDelta) -> Option<ResourceDelta> {
    if first.path != second.path {
        return Some(second.clone());
    }
    merge_node(first, second)
}

fn merge_node(a: &ResourceDelta, b: &ResourceDelta) -> Option<ResourceDelta> {
    use DeltaKind::*;

    let (kind, mut flags, phantom) = match (a.kind, b.kind) {
        (Added, Removed) | (AddedPhantom, RemovedPhantom) => return None,
        (Added, Changed) | (Added, NoChange) => (Added, a.flags, false),
        (AddedPhantom, Added) => (Added, b.flags, false),
        (AddedPhantom, _) => (AddedPhantom, a.flags | b.flags, false),
        (Removed, Added) => {
            let mut flags = DeltaFlags::REPLACED;
            if a.resource_kind != b.resource_kind {
                flags |= DeltaFlags::TYPE | DeltaFlags::CONTENT;
            } else if b.resource_kind == ResourceKind::File {
                flags |= DeltaFlags::CONTENT;
            }
            (Changed, flags, false)
        }
        (RemovedPhantom, AddedPhantom) => (Changed, a.flags | b.flags, true),
        (Changed, Removed) => (Removed, b.flags, false),
        (Changed, Changed) => (Changed, a.flags | b.flags, a.phantom && b.phantom),
        (NoChange, _) => (b.kind, b.flags, b.phantom),
        (_, NoChange) => (a.kind, a.flags, a.phantom),
        (_, later) => (later, b.flags, b.phantom),
    };

    let moved_from = a.moved_from.clone().or_else(|| b.moved_from.clone());
    let moved_to = b.moved_to.clone().or_else(|| a.moved_to.clone());
    flags.set(DeltaFlags::MOVED_FROM, moved_from.is_some() && kind != Removed);
    flags.set(DeltaFlags::MOVED_TO, moved_to.is_some() && kind != Added);

    let mut merged = ResourceDelta::new(b.path.clone(), b.resource_kind, kind);
    merged.flags = flags;
    merged.phantom = phantom;
    merged.moved_from = if kind == Removed { None } else { moved_from };
    merged.moved_to = if kind == Added { None } else { moved_to };
    merged.old_node = if a.kind == Added { None } else { a.old_node };
    merged.new_node = b.new_node;
    merged.marker_deltas = merge_marker_deltas(&a.marker_deltas, &b.marker_deltas);
    if !merged.marker_deltas.is_empty() && kind == Changed {
        merged.flags |= DeltaFlags::MARKERS;
    }
    merged.children = merge_children(&a.children, &b.children);

    if merged.kind == Changed
        && merged.flags.is_empty()
        && merged.marker_deltas.is_empty()
        && merged.children.is_empty()
    {
        return None;
    }
    Some(merged)
}

fn merge_children(first: &[ResourceDelta], second: &[ResourceDelta]) -> Vec<ResourceDelta> {
    let mut out = Vec::with_capacity(first.len().max(second.len()));
    let (mut i, mut j) = (0, 0);
    while i < first.len() || j < second.len() {
        let order = match (first.get(i), second.get(j)) {
            (Some(a), Some(b)) => a.name().cmp(b.name()),
            (Some(_), None) => Ordering::Less,
            (None, _) => Ordering::Greater,
        };
        match order {
            Ordering::Less => {
                out.push(first[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                out.push(second[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                if let Some(child) = merge_node(&first[i], &second[j]) {
                    out.push(child);
                }
                i += 1;
                j += 1;
            }
        }
    }
    out
}
