//! Canopy: a versioned workspace resource tree
//!
//! A namespace of projects, folders and files mirrored from the file
//! system. Every mutation runs inside an operation; when the outermost
//! operation ends, listeners receive one delta describing everything that
//! changed. The tree is copy-on-write, so snapshots taken for deltas and
//! cancellation share unchanged subtrees.

pub mod build;
pub mod charset;
pub mod cli;
pub mod config;
pub mod delta;
pub mod description;
pub mod error;
pub mod events;
pub mod filter;
pub mod location;
pub mod logging;
pub mod markers;
pub mod monitor;
pub mod operation;
pub mod refresh;
pub mod resource;
pub mod rules;
pub mod save;
pub mod store;
pub mod sync;
pub mod tree;
pub mod types;
pub mod workspace;

pub use delta::{DeltaFlags, DeltaKind, ResourceDelta};
pub use error::{MultiStatus, ResourceError};
pub use events::{EventMask, EventPhase, ResourceChangeEvent, ResourceChangeListener};
pub use resource::{Container, CreateFlags, File, Folder, MemberFlags, Project, Resource, ResourceHandle, UpdateFlags, WorkspaceRoot};
pub use tree::path::ResourcePath;
pub use types::{Depth, QualifiedName, ResourceKind};
pub use workspace::{HistoryState, ResourceSummary, Workspace};
