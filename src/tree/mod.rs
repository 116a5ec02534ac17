//! Versioned resource tree
//!
//! Holds every resource of the workspace as a copy-on-write tree of
//! [`info::ResourceInfo`] values. Snapshots share unchanged subtrees.

pub mod arena;
pub mod element;
pub mod info;
pub mod path;

pub use element::{ElementTree, Snapshot, Visit};
pub use info::{InfoFlags, LocalState, ResourceInfo};
pub use path::ResourcePath;
