//! Reference-counted node arena backing the element tree
//!
//! Nodes are immutable once a snapshot has been taken over them. Each
//! slot counts the parents and snapshot handles that point at it, and
//! is reclaimed when that count drops to zero.

use crate::tree::info::ResourceInfo;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Arena slot address. Distinct from the resource's [`crate::types::NodeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) u64);

#[derive(Debug, Clone)]
pub struct Node {
    pub info: Arc<ResourceInfo>,
    pub children: BTreeMap<String, SlotId>,
}

impl Node {
    pub fn leaf(info: Arc<ResourceInfo>) -> Self {
        Self {
            info,
            children: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    node: Node,
    refs: u32,
}

#[derive(Debug, Default)]
pub struct Arena {
    slots: HashMap<SlotId, Slot>,
    next: u64,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next slot id to be handed out; slots at or above a recorded value
    /// were allocated after that point.
    pub fn watermark(&self) -> u64 {
        self.next
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Allocate a node with a zero reference count. Its children gain a reference.
    pub fn alloc(&mut self, node: Node) -> SlotId {
        for child in node.children.values() {
            self.retain(*child);
        }
        let id = SlotId(self.next);
        self.next += 1;
        self.slots.insert(id, Slot { node, refs: 0 });
        id
    }

    pub fn get(&self, id: SlotId) -> Option<&Node> {
        self.slots.get(&id).map(|s| &s.node)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut Node> {
        self.slots.get_mut(&id).map(|s| &mut s.node)
    }

    pub fn refs(&self, id: SlotId) -> u32 {
        self.slots.get(&id).map_or(0, |s| s.refs)
    }

    pub fn retain(&mut self, id: SlotId) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.refs += 1;
        }
    }

    /// Drop one reference; frees the slot and, transitively, unreferenced
    /// children. Returns the number of slots freed.
    pub fn release(&mut self, id: SlotId) -> usize {
        let mut freed = 0;
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let drop_slot = match self.slots.get_mut(&current) {
                Some(slot) => {
                    slot.refs = slot.refs.saturating_sub(1);
                    slot.refs == 0
                }
                None => false,
            };
            if drop_slot {
                if let Some(slot) = self.slots.remove(&current) {
                    freed += 1;
                    pending.extend(slot.node.children.values().copied());
                }
            }
        }
        freed
    }

    /// Free a slot that was allocated but never linked anywhere.
    pub fn discard_if_unreferenced(&mut self, id: SlotId) {
        if self.refs(id) == 0 {
            if let Some(slot) = self.slots.remove(&id) {
                for child in slot.node.children.values() {
                    self.release(*child);
                }
            }
        }
    }

    /// Return a slot that can be edited in place, copying `id` when it is
    /// shared or older than `floor`.
    pub fn writable(&mut self, id: SlotId, floor: u64) -> Option<SlotId> {
        let slot = self.slots.get(&id)?;
        if id.0 >= floor && slot.refs <= 1 {
            return Some(id);
        }
        let copy = slot.node.clone();
        Some(self.alloc(copy))
    }
}
