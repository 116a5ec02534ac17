//! Resource handles
//!
//! Handles are lightweight path-and-kind values. They may name resources
//! that do not exist; every query goes through the workspace.

use crate::error::ResourceError;
use crate::tree::path::ResourcePath;
use crate::types::ResourceKind;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Which members listing and traversal report.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemberFlags: u32 {
        const INCLUDE_PHANTOMS = 1 << 0;
        const INCLUDE_TEAM_PRIVATE = 1 << 1;
        const INCLUDE_HIDDEN = 1 << 2;
    }
}

bitflags! {
    /// Options for resource creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CreateFlags: u32 {
        /// Adopt content already present on disk.
        const FORCE = 1 << 0;
        const DERIVED = 1 << 1;
        const TEAM_PRIVATE = 1 << 2;
        const HIDDEN = 1 << 3;
        /// Folder that exists only in the workspace.
        const VIRTUAL = 1 << 4;
        /// Create a link even though its target does not exist yet.
        const ALLOW_MISSING_LOCAL = 1 << 5;
    }
}

bitflags! {
    /// Options for content updates, deletion, moves and copies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UpdateFlags: u32 {
        /// Proceed even if the file system is out of sync with the tree.
        const FORCE = 1 << 0;
        /// Record replaced contents in the local history.
        const KEEP_HISTORY = 1 << 1;
        /// Move or copy a link as a link instead of its contents.
        const SHALLOW = 1 << 2;
        const ALWAYS_DELETE_PROJECT_CONTENT = 1 << 3;
        const NEVER_DELETE_PROJECT_CONTENT = 1 << 4;
    }
}

/// Common surface of every handle.
pub trait ResourceHandle {
    fn path(&self) -> &ResourcePath;
    fn kind(&self) -> ResourceKind;

    fn name(&self) -> &str {
        self.path().last_segment().unwrap_or("")
    }

    fn to_resource(&self) -> Resource {
        Resource::from_kind(self.path().clone(), self.kind())
    }
}

/// Handles that can have members.
pub trait Container: ResourceHandle {
    fn file(&self, name: &str) -> Result<File, ResourceError> {
        Ok(File {
            path: self.member_path(name)?,
        })
    }

    fn folder(&self, name: &str) -> Result<Folder, ResourceError> {
        Ok(Folder {
            path: self.member_path(name)?,
        })
    }

    fn member_path(&self, name: &str) -> Result<ResourcePath, ResourceError> {
        if self.path().is_root() {
            return Err(ResourceError::invalid(
                self.path(),
                "only projects can be members of the workspace root",
            ));
        }
        self.path().child(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WorkspaceRoot;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Project {
    path: ResourcePath,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Folder {
    path: ResourcePath,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct File {
    path: ResourcePath,
}

static ROOT_PATH: std::sync::OnceLock<ResourcePath> = std::sync::OnceLock::new();

impl WorkspaceRoot {
    pub fn project(&self, name: &str) -> Result<Project, ResourceError> {
        Ok(Project {
            path: ResourcePath::root().child(name)?,
        })
    }
}

impl ResourceHandle for WorkspaceRoot {
    fn path(&self) -> &ResourcePath {
        ROOT_PATH.get_or_init(ResourcePath::root)
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Root
    }
}

impl Container for WorkspaceRoot {}

macro_rules! handle {
    ($ty:ident, $kind:expr, $segments:expr) => {
        impl $ty {
            /// Handle for `path`; fails if the path has the wrong depth.
            pub fn new(path: ResourcePath) -> Result<Self, ResourceError> {
                let ok: fn(usize) -> bool = $segments;
                if !ok(path.segment_count()) {
                    return Err(ResourceError::invalid(
                        &path,
                        format!("path cannot name a {}", $kind),
                    ));
                }
                Ok(Self { path })
            }

            pub fn parse(path: &str) -> Result<Self, ResourceError> {
                Self::new(ResourcePath::parse(path)?)
            }
        }

        impl ResourceHandle for $ty {
            fn path(&self) -> &ResourcePath {
                &self.path
            }

            fn kind(&self) -> ResourceKind {
                $kind
            }
        }

        impl From<$ty> for Resource {
            fn from(handle: $ty) -> Resource {
                Resource::$ty(handle)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.path)
            }
        }
    };
}

handle!(Project, ResourceKind::Project, |n| n == 1);
handle!(Folder, ResourceKind::Folder, |n| n >= 2);
handle!(File, ResourceKind::File, |n| n >= 2);

impl Container for Project {}
impl Container for Folder {}

impl Project {
    pub fn project_name(&self) -> &str {
        self.name()
    }
}

/// Closed set of resource handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Root(WorkspaceRoot),
    Project(Project),
    Folder(Folder),
    File(File),
}

impl Resource {
    /// Handle for a path and kind that are known to agree.
    pub fn from_kind(path: ResourcePath, kind: ResourceKind) -> Resource {
        match kind {
            ResourceKind::Root => Resource::Root(WorkspaceRoot),
            ResourceKind::Project => Resource::Project(Project { path }),
            ResourceKind::Folder => Resource::Folder(Folder { path }),
            ResourceKind::File => Resource::File(File { path }),
        }
    }

    /// Handle of the container holding `path`.
    pub fn parent_of(path: &ResourcePath) -> Option<Resource> {
        let parent = path.parent()?;
        let kind = match parent.segment_count() {
            0 => ResourceKind::Root,
            1 => ResourceKind::Project,
            _ => ResourceKind::Folder,
        };
        Some(Resource::from_kind(parent, kind))
    }

    pub fn parent(&self) -> Option<Resource> {
        Resource::parent_of(self.path())
    }

    pub fn is_container(&self) -> bool {
        self.kind().is_container()
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Resource::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            Resource::Folder(folder) => Some(folder),
            _ => None,
        }
    }

    pub fn as_project(&self) -> Option<&Project> {
        match self {
            Resource::Project(project) => Some(project),
            _ => None,
        }
    }
}

impl ResourceHandle for Resource {
    fn path(&self) -> &ResourcePath {
        match self {
            Resource::Root(root) => root.path(),
            Resource::Project(p) => p.path(),
            Resource::Folder(f) => f.path(),
            Resource::File(f) => f.path(),
        }
    }

    fn kind(&self) -> ResourceKind {
        match self {
            Resource::Root(_) => ResourceKind::Root,
            Resource::Project(_) => ResourceKind::Project,
            Resource::Folder(_) => ResourceKind::Folder,
            Resource::File(_) => ResourceKind::File,
        }
    }
}

impl From<WorkspaceRoot> for Resource {
    fn from(root: WorkspaceRoot) -> Resource {
        Resource::Root(root)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.path())
    }
}
