//! File store backed by the local file system

use crate::error::ResourceError;
use crate::store::{FileInfo, FileStore};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct LocalFileStore {
    /// Whether symbolic links are followed when reading metadata.
    follow_symlinks: bool,
}

impl LocalFileStore {
    pub fn new(follow_symlinks: bool) -> Self {
        Self { follow_symlinks }
    }

    fn metadata(&self, location: &Path) -> std::io::Result<fs::Metadata> {
        if self.follow_symlinks {
            fs::metadata(location)
        } else {
            fs::symlink_metadata(location)
        }
    }
}

impl FileStore for LocalFileStore {
    fn fetch_info(&self, location: &Path) -> Result<FileInfo, ResourceError> {
        match self.metadata(location) {
            Ok(metadata) => {
                let last_modified = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos() as i64)
                    .unwrap_or(0);
                Ok(FileInfo {
                    exists: true,
                    is_directory: metadata.is_dir(),
                    last_modified,
                    length: if metadata.is_dir() { 0 } else { metadata.len() },
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(FileInfo::missing()),
            Err(e) => Err(ResourceError::io(location, e)),
        }
    }

    fn list(&self, location: &Path) -> Result<Vec<String>, ResourceError> {
        let entries = fs::read_dir(location).map_err(|e| ResourceError::io(location, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ResourceError::io(location, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, location: &Path) -> Result<Vec<u8>, ResourceError> {
        fs::read(location).map_err(|e| ResourceError::io(location, e))
    }

    fn write(&self, location: &Path, contents: &[u8]) -> Result<(), ResourceError> {
        fs::write(location, contents).map_err(|e| ResourceError::io(location, e))
    }

    fn mkdir(&self, location: &Path, recursive: bool) -> Result<(), ResourceError> {
        let result = if recursive {
            fs::create_dir_all(location)
        } else {
            fs::create_dir(location)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && location.is_dir() => Ok(()),
            Err(e) => Err(ResourceError::io(location, e)),
        }
    }

    fn delete(&self, location: &Path) -> Result<(), ResourceError> {
        let metadata = match fs::symlink_metadata(location) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ResourceError::io(location, e)),
        };
        let result = if metadata.is_dir() {
            fs::remove_dir_all(location)
        } else {
            fs::remove_file(location)
        };
        result.map_err(|e| ResourceError::io(location, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), ResourceError> {
        if let Err(e) = fs::rename(from, to) {
            if !self.fetch_info(from)?.exists {
                return Err(ResourceError::io(from, e));
            }
            // cross-device moves fall back to copy and delete
            self.copy_tree(from, to)?;
            self.delete(from)?;
        }
        Ok(())
    }

    fn copy_tree(&self, from: &Path, to: &Path) -> Result<(), ResourceError> {
        let walker = WalkDir::new(from).follow_links(self.follow_symlinks).sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| {
                ResourceError::io(
                    from,
                    std::io::Error::new(ErrorKind::Other, format!("Failed to walk directory: {}", e)),
                )
            })?;
            let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
            let target = to.join(relative);
            if entry.file_type().is_dir() {
                self.mkdir(&target, true)?;
            } else {
                fs::copy(entry.path(), &target).map_err(|e| ResourceError::io(&target, e))?;
            }
        }
        Ok(())
    }
}
