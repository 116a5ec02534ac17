//! A small tree model driven by generated operations

use canopy::delta::{compute_delta, DiffContext};
use canopy::tree::arena::SlotId;
use canopy::tree::{ElementTree, InfoFlags, ResourceInfo, ResourcePath};
use canopy::types::NodeId;
use canopy::{DeltaFlags, DeltaKind, ResourceDelta, ResourceKind};
use proptest::prelude::*;
use std::collections::BTreeMap;

pub const FILE_COUNT: usize = 6;

#[derive(Debug, Clone, Copy)]
pub enum Op {
    Create(usize),
    Remove(usize),
    Touch(usize),
}

pub fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..FILE_COUNT).prop_map(Op::Create),
        (0..FILE_COUNT).prop_map(Op::Remove),
        (0..FILE_COUNT).prop_map(Op::Touch),
    ]
}

pub fn file_path(index: usize) -> ResourcePath {
    ResourcePath::parse(&format!("/P/f{}.txt", index)).unwrap()
}

/// Tree holding an open project `/P` and hands out fresh node ids.
pub struct Model {
    pub tree: ElementTree,
    next_id: u64,
}

impl Model {
    pub fn new() -> Self {
        let mut root = ResourceInfo::new(ResourceKind::Root, NodeId(0));
        root.flags = InfoFlags::OPEN;
        let mut tree = ElementTree::new(root);
        let mut project = ResourceInfo::new(ResourceKind::Project, NodeId(1));
        project.flags = InfoFlags::OPEN;
        tree.create(&ResourcePath::parse("/P").unwrap(), project).unwrap();
        Self { tree, next_id: 2 }
    }

    pub fn apply(&mut self, op: Op) {
        match op {
            Op::Create(i) => {
                let path = file_path(i);
                if self.tree.info(&path).is_none() {
                    let info = ResourceInfo::new(ResourceKind::File, NodeId(self.next_id));
                    self.next_id += 1;
                    self.tree.create(&path, info).unwrap();
                }
            }
            Op::Remove(i) => {
                let path = file_path(i);
                if self.tree.info(&path).is_some() {
                    self.tree.remove(&path).unwrap();
                }
            }
            Op::Touch(i) => {
                let path = file_path(i);
                if self.tree.info(&path).is_some() {
                    self.tree.update(&path, |info| info.content_id += 1).unwrap();
                }
            }
        }
    }

    /// Names of the files currently present, with their content ids.
    pub fn files(&self) -> BTreeMap<String, u64> {
        self.tree
            .children(&ResourcePath::parse("/P").unwrap())
            .into_iter()
            .map(|(name, info)| (name, info.content_id))
            .collect()
    }
}

pub fn delta(tree: &ElementTree, old: SlotId, new: SlotId) -> Option<ResourceDelta> {
    compute_delta(tree, old, new, &DiffContext { default_charset: "UTF-8" })
}

/// File-level view of a delta: kind and whether content changed.
pub fn file_changes(delta: Option<&ResourceDelta>) -> BTreeMap<String, (DeltaKind, bool)> {
    let mut changes = BTreeMap::new();
    if let Some(delta) = delta {
        delta.accept(true, &mut |node: &ResourceDelta| {
            if node.resource_kind() == ResourceKind::File {
                changes.insert(
                    node.path().to_string(),
                    (node.kind(), node.flags().contains(DeltaFlags::CONTENT)),
                );
            }
            true
        });
    }
    changes
}
