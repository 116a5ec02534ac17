//! In-memory file store for tests and benchmarks

use crate::error::ResourceError;
use crate::store::{FileInfo, FileStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Clone)]
enum Entry {
    Directory { modified: i64 },
    File { contents: Vec<u8>, modified: i64 },
}

/// File store holding every entry in a map keyed by absolute path.
///
/// Modification times come from a counter, so every write is observable
/// as a change. `/` always exists.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    entries: RwLock<BTreeMap<PathBuf, Entry>>,
    clock: AtomicI64,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_dir(entries: &BTreeMap<PathBuf, Entry>, location: &Path) -> bool {
        location.parent().is_none() || matches!(entries.get(location), Some(Entry::Directory { .. }))
    }

    fn missing(location: &Path, what: &str) -> ResourceError {
        ResourceError::io(location, Error::new(ErrorKind::NotFound, what.to_string()))
    }

    /// Keys of `location` and everything below it.
    fn subtree_keys(entries: &BTreeMap<PathBuf, Entry>, location: &Path) -> Vec<PathBuf> {
        entries
            .range(location.to_path_buf()..)
            .take_while(|(k, _)| k.starts_with(location))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of stored entries, for assertions.
    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}

impl FileStore for MemoryFileStore {
    fn fetch_info(&self, location: &Path) -> Result<FileInfo, ResourceError> {
        let entries = self.entries.read();
        Ok(match entries.get(location) {
            Some(Entry::Directory { modified }) => FileInfo {
                exists: true,
                is_directory: true,
                last_modified: *modified,
                length: 0,
            },
            Some(Entry::File { contents, modified }) => FileInfo {
                exists: true,
                is_directory: false,
                last_modified: *modified,
                length: contents.len() as u64,
            },
            None if location.parent().is_none() => FileInfo {
                exists: true,
                is_directory: true,
                last_modified: 0,
                length: 0,
            },
            None => FileInfo::missing(),
        })
    }

    fn list(&self, location: &Path) -> Result<Vec<String>, ResourceError> {
        let entries = self.entries.read();
        if !Self::is_dir(&entries, location) {
            return Err(Self::missing(location, "not a directory"));
        }
        let mut names: Vec<String> = entries
            .keys()
            .filter(|k| k.parent() == Some(location))
            .filter_map(|k| k.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }

    fn read(&self, location: &Path) -> Result<Vec<u8>, ResourceError> {
        match self.entries.read().get(location) {
            Some(Entry::File { contents, .. }) => Ok(contents.clone()),
            _ => Err(Self::missing(location, "no such file")),
        }
    }

    fn write(&self, location: &Path, contents: &[u8]) -> Result<(), ResourceError> {
        let modified = self.tick();
        let mut entries = self.entries.write();
        let parent_ok = location.parent().map_or(false, |p| Self::is_dir(&entries, p));
        if !parent_ok {
            return Err(Self::missing(location, "parent directory does not exist"));
        }
        if matches!(entries.get(location), Some(Entry::Directory { .. })) {
            return Err(ResourceError::io(
                location,
                Error::new(ErrorKind::Other, "location is a directory"),
            ));
        }
        entries.insert(
            location.to_path_buf(),
            Entry::File {
                contents: contents.to_vec(),
                modified,
            },
        );
        Ok(())
    }

    fn mkdir(&self, location: &Path, recursive: bool) -> Result<(), ResourceError> {
        let modified = self.tick();
        let mut entries = self.entries.write();
        let mut pending = Vec::new();
        let mut current = Some(location);
        while let Some(dir) = current {
            if Self::is_dir(&entries, dir) {
                break;
            }
            if entries.contains_key(dir) {
                return Err(ResourceError::io(
                    dir,
                    Error::new(ErrorKind::AlreadyExists, "a file is in the way"),
                ));
            }
            pending.push(dir.to_path_buf());
            if !recursive && pending.len() > 1 {
                return Err(Self::missing(location, "parent directory does not exist"));
            }
            current = dir.parent();
        }
        for dir in pending {
            entries.insert(dir, Entry::Directory { modified });
        }
        Ok(())
    }

    fn delete(&self, location: &Path) -> Result<(), ResourceError> {
        let mut entries = self.entries.write();
        for key in Self::subtree_keys(&entries, location) {
            entries.remove(&key);
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), ResourceError> {
        let modified = self.tick();
        let mut entries = self.entries.write();
        let keys = Self::subtree_keys(&entries, from);
        if keys.is_empty() {
            return Err(Self::missing(from, "rename source does not exist"));
        }
        let parent_ok = to.parent().map_or(false, |p| Self::is_dir(&entries, p));
        if !parent_ok {
            return Err(Self::missing(to, "rename target parent does not exist"));
        }
        for key in keys {
            if let Some(entry) = entries.remove(&key) {
                let relative = key.strip_prefix(from).unwrap_or(Path::new(""));
                let entry = match entry {
                    Entry::Directory { .. } => Entry::Directory { modified },
                    file => file,
                };
                entries.insert(to.join(relative), entry);
            }
        }
        Ok(())
    }
}
