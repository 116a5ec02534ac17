//! Copy-on-write element tree
//!
//! The tree owns an arena of nodes. A snapshot is a retained root slot;
//! taking one freezes every node that exists at that moment, so later
//! writes copy the path from the changed node up to a new root and
//! leave the snapshot untouched. Nodes created after the last snapshot
//! are private to the working tree and are edited in place.

use crate::error::ResourceError;
use crate::tree::arena::{Arena, Node, SlotId};
use crate::tree::info::ResourceInfo;
use crate::tree::path::ResourcePath;
use std::sync::Arc;

/// Retained handle on an immutable tree version.
///
/// Must be handed back through [`ElementTree::release`]; dropping it
/// without releasing keeps its nodes alive until the tree itself drops.
#[derive(Debug)]
pub struct Snapshot {
    root: SlotId,
}

impl Snapshot {
    pub fn root(&self) -> SlotId {
        self.root
    }
}

/// Traversal control returned by [`ElementTree::walk`] callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    SkipChildren,
}

#[derive(Debug)]
pub struct ElementTree {
    arena: Arena,
    current: SlotId,
    floor: u64,
}

impl ElementTree {
    pub fn new(root_info: ResourceInfo) -> Self {
        let mut arena = Arena::new();
        let root = arena.alloc(Node::leaf(Arc::new(root_info)));
        arena.retain(root);
        Self {
            arena,
            current: root,
            floor: 0,
        }
    }

    /// Root slot of the working tree.
    pub fn current(&self) -> SlotId {
        self.current
    }

    /// Freeze the working tree and return a retained handle on it.
    pub fn snapshot(&mut self) -> Snapshot {
        self.freeze();
        self.arena.retain(self.current);
        Snapshot { root: self.current }
    }

    /// Make every existing node immutable.
    pub fn freeze(&mut self) {
        self.floor = self.arena.watermark();
    }

    /// Release a snapshot. Returns the number of nodes reclaimed.
    pub fn release(&mut self, snapshot: Snapshot) -> usize {
        self.arena.release(snapshot.root)
    }

    /// Replace the working tree with the contents of `snapshot`.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        if snapshot.root == self.current {
            return;
        }
        self.arena.retain(snapshot.root);
        let previous = self.current;
        self.current = snapshot.root;
        self.arena.release(previous);
        self.freeze();
    }

    /// Put the subtree at `path` back to its state in `snapshot`,
    /// removing it if it did not exist there. The parent must exist.
    pub fn restore_subtree(&mut self, snapshot: &Snapshot, path: &ResourcePath) -> Result<(), ResourceError> {
        if path.is_root() {
            self.restore(snapshot);
            return Ok(());
        }
        match self.lookup_in(snapshot.root, path) {
            Some(slot) if Some(slot) == self.lookup(path) => Ok(()),
            Some(slot) => self.graft(path, slot),
            None if self.lookup(path).is_some() => self.remove(path),
            None => Ok(()),
        }
    }

    /// Number of live nodes across all retained versions.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub fn node(&self, id: SlotId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub fn lookup_in(&self, root: SlotId, path: &ResourcePath) -> Option<SlotId> {
        let mut current = root;
        for segment in path.segments() {
            current = *self.arena.get(current)?.children.get(segment)?;
        }
        Some(current)
    }

    pub fn lookup(&self, path: &ResourcePath) -> Option<SlotId> {
        self.lookup_in(self.current, path)
    }

    pub fn info_in(&self, root: SlotId, path: &ResourcePath) -> Option<&Arc<ResourceInfo>> {
        self.lookup_in(root, path)
            .and_then(|id| self.arena.get(id))
            .map(|n| &n.info)
    }

    /// Raw lookup, including phantoms and members of closed projects.
    pub fn info(&self, path: &ResourcePath) -> Option<&Arc<ResourceInfo>> {
        self.info_in(self.current, path)
    }

    /// Lookup that treats members of closed projects as absent.
    pub fn visible_info(&self, path: &ResourcePath) -> Option<&Arc<ResourceInfo>> {
        let mut current = self.current;
        for (depth, segment) in path.segments().iter().enumerate() {
            let node = self.arena.get(current)?;
            if depth > 0 && !node.info.exposes_children() {
                return None;
            }
            current = *node.children.get(segment)?;
        }
        self.arena.get(current).map(|n| &n.info)
    }

    pub fn child_names(&self, path: &ResourcePath) -> Vec<String> {
        self.lookup(path)
            .and_then(|id| self.arena.get(id))
            .map(|n| n.children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Children of `path` with their infos, in name order.
    pub fn children(&self, path: &ResourcePath) -> Vec<(String, Arc<ResourceInfo>)> {
        let Some(node) = self.lookup(path).and_then(|id| self.arena.get(id)) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|(name, id)| {
                self.arena
                    .get(*id)
                    .map(|child| (name.clone(), child.info.clone()))
            })
            .collect()
    }

    /// Pre-order walk of the raw subtree at `path`.
    pub fn walk<F>(&self, path: &ResourcePath, mut visit: F) -> Result<(), ResourceError>
    where
        F: FnMut(&ResourcePath, &Arc<ResourceInfo>) -> Result<Visit, ResourceError>,
    {
        let Some(start) = self.lookup(path) else {
            return Ok(());
        };
        let mut pending = vec![(path.clone(), start)];
        while let Some((current_path, id)) = pending.pop() {
            let Some(node) = self.arena.get(id) else {
                continue;
            };
            if visit(&current_path, &node.info)? == Visit::SkipChildren {
                continue;
            }
            // reversed so names pop in ascending order
            for (name, child) in node.children.iter().rev() {
                pending.push((current_path.append(name), *child));
            }
        }
        Ok(())
    }

    /// Insert a fresh leaf at `path`, replacing anything already there.
    pub fn create(&mut self, path: &ResourcePath, info: ResourceInfo) -> Result<(), ResourceError> {
        if path.is_root() {
            return Err(ResourceError::invalid(path, "cannot create the workspace root"));
        }
        self.rewrite(path, |arena, _, _| {
            Ok(Some(arena.alloc(Node::leaf(Arc::new(info)))))
        })
    }

    /// Replace the info at `path`, keeping its children.
    pub fn set_info(&mut self, path: &ResourcePath, info: ResourceInfo) -> Result<(), ResourceError> {
        self.update(path, |existing| *existing = info)
    }

    /// Edit the info at `path` in place when private, or by copy otherwise.
    pub fn update<F>(&mut self, path: &ResourcePath, edit: F) -> Result<(), ResourceError>
    where
        F: FnOnce(&mut ResourceInfo),
    {
        let missing = path.clone();
        self.rewrite(path, move |arena, floor, target| {
            let target = target.ok_or_else(|| ResourceError::NotFound(missing.clone()))?;
            let writable = arena
                .writable(target, floor)
                .ok_or_else(|| ResourceError::NotFound(missing.clone()))?;
            if let Some(node) = arena.get_mut(writable) {
                edit(Arc::make_mut(&mut node.info));
            }
            Ok(Some(writable))
        })
    }

    /// Remove the subtree at `path`.
    pub fn remove(&mut self, path: &ResourcePath) -> Result<(), ResourceError> {
        if path.is_root() {
            return Err(ResourceError::invalid(path, "cannot remove the workspace root"));
        }
        let missing = path.clone();
        self.rewrite(path, move |_, _, target| {
            target.ok_or(ResourceError::NotFound(missing))?;
            Ok(None)
        })
    }

    /// Attach an existing subtree at `path`, sharing its nodes.
    pub fn graft(&mut self, path: &ResourcePath, subtree: SlotId) -> Result<(), ResourceError> {
        if path.is_root() {
            return Err(ResourceError::invalid(path, "cannot graft over the workspace root"));
        }
        let result = self.rewrite(path, |_, _, _| Ok(Some(subtree)));
        self.arena.discard_if_unreferenced(subtree);
        result
    }

    /// Build a transformed copy of the subtree at `source`, post-order.
    ///
    /// `map` receives the path relative to `source`, the node's info and
    /// whether any child was kept, and returns the new info or `None` to
    /// drop the node. Returns an unlinked slot to pass to [`Self::graft`].
    pub fn transform_subtree<F>(&mut self, source: SlotId, map: &mut F) -> Option<SlotId>
    where
        F: FnMut(&[String], &ResourceInfo, bool) -> Option<ResourceInfo>,
    {
        let mut relative = Vec::new();
        self.transform_node(source, &mut relative, map)
    }

    fn transform_node<F>(
        &mut self,
        source: SlotId,
        relative: &mut Vec<String>,
        map: &mut F,
    ) -> Option<SlotId>
    where
        F: FnMut(&[String], &ResourceInfo, bool) -> Option<ResourceInfo>,
    {
        let node = self.arena.get(source)?.clone();
        let mut children = std::collections::BTreeMap::new();
        for (name, child) in &node.children {
            relative.push(name.clone());
            if let Some(copy) = self.transform_node(*child, relative, map) {
                children.insert(name.clone(), copy);
            }
            relative.pop();
        }
        match map(relative, &node.info, !children.is_empty()) {
            Some(info) => Some(self.arena.alloc(Node {
                info: Arc::new(info),
                children,
            })),
            None => {
                for copy in children.values() {
                    self.arena.discard_if_unreferenced(*copy);
                }
                None
            }
        }
    }

    fn rewrite<F>(&mut self, path: &ResourcePath, op: F) -> Result<(), ResourceError>
    where
        F: FnOnce(&mut Arena, u64, Option<SlotId>) -> Result<Option<SlotId>, ResourceError>,
    {
        let segments = path.segments();

        // 1. Resolve the chain of ancestors down to the target's parent
        let mut chain = vec![self.current];
        for (depth, segment) in segments.iter().enumerate().take(segments.len().saturating_sub(1)) {
            let parent = chain[depth];
            let next = self
                .arena
                .get(parent)
                .and_then(|n| n.children.get(segment))
                .copied()
                .ok_or_else(|| ResourceError::NotFound(path.prefix(depth + 1)))?;
            chain.push(next);
        }

        // 2. Apply the operation to the target slot
        let target = match segments.last() {
            None => Some(self.current),
            Some(name) => chain
                .last()
                .and_then(|p| self.arena.get(*p))
                .and_then(|n| n.children.get(name))
                .copied(),
        };
        let mut new_child = op(&mut self.arena, self.floor, target)?;
        let mut old_child = target;

        // 3. Propagate the replacement up to the root
        for depth in (0..segments.len()).rev() {
            if new_child == old_child {
                return Ok(());
            }
            let parent = chain[depth];
            let writable = self
                .arena
                .writable(parent, self.floor)
                .ok_or_else(|| ResourceError::NotFound(path.prefix(depth)))?;
            if let Some(child) = new_child {
                self.arena.retain(child);
            }
            let name = &segments[depth];
            let previous = match self.arena.get_mut(writable) {
                Some(node) => match new_child {
                    Some(child) => node.children.insert(name.clone(), child),
                    None => node.children.remove(name),
                },
                None => None,
            };
            if let Some(previous) = previous {
                self.arena.release(previous);
            }
            old_child = Some(parent);
            new_child = Some(writable);
        }

        match new_child {
            Some(root) if Some(root) != old_child => {
                self.arena.retain(root);
                let previous = self.current;
                self.current = root;
                self.arena.release(previous);
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(ResourceError::invalid(path, "cannot remove the workspace root")),
        }
    }
}
