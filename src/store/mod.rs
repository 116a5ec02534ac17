//! Storage boundaries
//!
//! [`FileStore`] is the engine's only view of the file system. The
//! record store persists marker and sync-info records between sessions.

pub mod local;
pub mod memory;
pub mod persistence;

pub use local::LocalFileStore;
pub use memory::MemoryFileStore;
pub use persistence::SledSaveStore;

use crate::error::{ResourceError, StorageError};
use crate::save::SaveRecord;
use crate::tree::info::LocalState;
use std::path::Path;

/// File-system state of one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileInfo {
    pub exists: bool,
    pub is_directory: bool,
    /// Modification time in nanoseconds, or a store-specific counter.
    pub last_modified: i64,
    pub length: u64,
}

impl FileInfo {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn local_state(&self) -> LocalState {
        LocalState {
            last_modified: self.last_modified,
            length: self.length,
        }
    }
}

pub trait FileStore: Send + Sync {
    /// State of `location`; a missing location is not an error.
    fn fetch_info(&self, location: &Path) -> Result<FileInfo, ResourceError>;

    /// Names of the direct children of a directory, sorted.
    fn list(&self, location: &Path) -> Result<Vec<String>, ResourceError>;

    fn read(&self, location: &Path) -> Result<Vec<u8>, ResourceError>;

    /// Create or replace a file. The parent directory must exist.
    fn write(&self, location: &Path, contents: &[u8]) -> Result<(), ResourceError>;

    fn mkdir(&self, location: &Path, recursive: bool) -> Result<(), ResourceError>;

    /// Delete a file or a directory with its contents. Missing is not an error.
    fn delete(&self, location: &Path) -> Result<(), ResourceError>;

    fn rename(&self, from: &Path, to: &Path) -> Result<(), ResourceError>;

    /// Copy a file or directory tree.
    fn copy_tree(&self, from: &Path, to: &Path) -> Result<(), ResourceError> {
        let info = self.fetch_info(from)?;
        if !info.exists {
            return Err(ResourceError::io(
                from,
                std::io::Error::new(std::io::ErrorKind::NotFound, "copy source does not exist"),
            ));
        }
        if info.is_directory {
            self.mkdir(to, true)?;
            for name in self.list(from)? {
                self.copy_tree(&from.join(&name), &to.join(&name))?;
            }
            Ok(())
        } else {
            let contents = self.read(from)?;
            self.write(to, &contents)
        }
    }
}

/// Persistence of the marker and sync-info record stream.
pub trait SaveStore {
    fn save(&self, records: &[SaveRecord]) -> Result<(), StorageError>;
    fn load(&self) -> Result<Vec<SaveRecord>, StorageError>;
}
