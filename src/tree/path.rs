//! Workspace paths and local location normalization

use crate::error::ResourceError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Absolute path of a resource inside the workspace namespace.
///
/// The empty path is the workspace root, `/P` is a project, and deeper
/// paths are folders and files. Segments are stored NFC-normalized.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse a slash-separated workspace path. Leading and trailing
    /// slashes are optional; every segment must be a valid name.
    pub fn parse(s: &str) -> Result<Self, ResourceError> {
        let trimmed = s.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Self::from_segments(trimmed.split('/'))
    }

    pub fn from_segments<I, S>(segments: I) -> Result<Self, ResourceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for segment in segments {
            let segment = segment.as_ref();
            if let Err(reason) = validate_segment(segment) {
                return Err(ResourceError::InvalidValue {
                    path: Self { segments: out },
                    reason,
                });
            }
            out.push(normalize_segment(segment));
        }
        Ok(Self { segments: out })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// First segment, which names the owning project.
    pub fn project_name(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn parent(&self) -> Option<ResourcePath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Path of the first `count` segments.
    pub fn prefix(&self, count: usize) -> ResourcePath {
        Self {
            segments: self.segments[..count.min(self.segments.len())].to_vec(),
        }
    }

    /// Append an already validated name.
    pub fn append(&self, name: &str) -> ResourcePath {
        let mut segments = self.segments.clone();
        segments.push(normalize_segment(name));
        Self { segments }
    }

    /// Append a name after validating it.
    pub fn child(&self, name: &str) -> Result<ResourcePath, ResourceError> {
        validate_segment(name).map_err(|reason| ResourceError::InvalidValue {
            path: self.clone(),
            reason,
        })?;
        Ok(self.append(name))
    }

    pub fn join_segments(&self, rest: &[String]) -> ResourcePath {
        let mut segments = self.segments.clone();
        segments.extend(rest.iter().cloned());
        Self { segments }
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &ResourcePath) -> bool {
        other.segments.len() >= self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// Segments of `self` below `prefix`, if `prefix` is an ancestor-or-self.
    pub fn strip_prefix(&self, prefix: &ResourcePath) -> Option<&[String]> {
        if prefix.is_prefix_of(self) {
            Some(&self.segments[prefix.segments.len()..])
        } else {
            None
        }
    }

    /// Re-root `self` from under `from` to under `to`.
    pub fn rebase(&self, from: &ResourcePath, to: &ResourcePath) -> Option<ResourcePath> {
        self.strip_prefix(from).map(|rest| to.join_segments(rest))
    }

    /// Relative filesystem path built from the given segment slice.
    pub fn relative_fs(segments: &[String]) -> PathBuf {
        segments.iter().collect()
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourcePath({})", self)
    }
}

impl Serialize for ResourcePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourcePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ResourcePath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Check a single resource name.
///
/// Rejects empty names, `.` and `..`, separators, NUL, device markers
/// and names with leading or trailing whitespace.
pub fn validate_segment(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".to_string());
    }
    if name == "." || name == ".." {
        return Err(format!("'{}' is a reserved name", name));
    }
    if let Some(c) = name.chars().find(|c| matches!(c, '/' | '\\' | '\0' | ':')) {
        return Err(format!("'{}' contains the invalid character {:?}", name, c));
    }
    if name.trim() != name {
        return Err(format!("'{}' has leading or trailing whitespace", name));
    }
    Ok(())
}

/// NFC-normalize a resource name.
pub fn normalize_segment(name: &str) -> String {
    name.nfc().collect()
}

/// Canonicalize a local location for alias comparison.
///
/// Existing locations are resolved through `dunce`; missing ones are
/// normalized lexically so links to absent targets still compare.
pub fn canonicalize_location(path: &Path) -> PathBuf {
    let resolved = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let normalized: String = resolved.to_string_lossy().nfc().collect();

    let mut normalized_path = PathBuf::from(normalized);
    if normalized_path.as_os_str().len() > 1 {
        let mut s = normalized_path.to_string_lossy().to_string();
        while s.len() > 1 && (s.ends_with('/') || s.ends_with('\\')) {
            s.pop();
        }
        normalized_path = PathBuf::from(s);
    }
    normalized_path
}
