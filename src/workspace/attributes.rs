//! Content, flags, charsets, properties and local history

use super::Workspace;
use crate::error::ResourceError;
use crate::monitor::NullMonitor;
use crate::resource::{Container, File, ResourceHandle, UpdateFlags};
use crate::rules::SchedulingRule;
use crate::tree::element::{ElementTree, Visit};
use crate::tree::info::{InfoFlags, PropertyMap, ResourceInfo};
use crate::tree::path::ResourcePath;
use crate::types::{QualifiedName, ResourceKind};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Replaced file contents kept by `KEEP_HISTORY`.
const MAX_HISTORY_STATES: usize = 32;

/// One entry of a file's local history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryState {
    /// Modification stamp of the file when the state was saved.
    pub stamp: i64,
    pub contents: Vec<u8>,
    pub saved_at: DateTime<Utc>,
}

impl Workspace {
    /// Replace a file's contents.
    ///
    /// Without `FORCE` the file must be in sync with the file system.
    /// With `KEEP_HISTORY` the previous contents go to the local history.
    pub fn set_contents(&self, file: &File, contents: &[u8], flags: UpdateFlags) -> Result<(), ResourceError> {
        let path = file.path().clone();
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            let info = ws.check_accessible(&tree, &path, Some(ResourceKind::File))?;
            ws.check_link_local(&tree, &path)?;
            let location = ws.require_location(&tree, &path)?;
            let disk = ws.store.fetch_info(&location)?;
            if disk.is_directory {
                return Err(ResourceError::WrongTypeLocal { path, location });
            }
            if !flags.contains(UpdateFlags::FORCE) && (!disk.exists || info.local != Some(disk.local_state())) {
                return Err(ResourceError::OutOfSync(path));
            }
            if flags.contains(UpdateFlags::KEEP_HISTORY) && disk.exists {
                ws.remember(&path, info.modification_stamp, &location);
            }

            ws.store.write(&location, contents)?;
            let disk = ws.store.fetch_info(&location)?;
            let detected = ws.detect_charset(file.name(), contents);
            let content_id = ws.next_content_id();
            let stamp = ws.next_stamp();
            tree.update(&path, |info| {
                info.local = Some(disk.local_state());
                info.content_id = content_id;
                info.modification_stamp = stamp;
                info.detected_charset = detected;
                info.flags.insert(InfoFlags::LOCAL_EXISTS);
            })?;
            ws.refresh_aliases(&mut tree, &path)?;
            debug!(path = %path, bytes = contents.len(), "Contents replaced");
            Ok(())
        })
    }

    /// Bump the modification stamp. Nothing else changes, so no delta is
    /// reported.
    pub fn touch<R: ResourceHandle + ?Sized>(&self, resource: &R) -> Result<(), ResourceError> {
        let path = resource.path().clone();
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            ws.check_accessible(&tree, &path, None)?;
            let stamp = ws.next_stamp();
            tree.update(&path, |info| info.modification_stamp = stamp)
        })
    }

    fn set_flag<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        flag: InfoFlags,
        value: bool,
    ) -> Result<(), ResourceError> {
        let path = resource.path().clone();
        // the root and projects cannot carry these flags; setting them is a no-op
        if path.segment_count() < 2 {
            trace!(path = %path, flag = ?flag, "Ignoring flag on root or project");
            return Ok(());
        }
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            let info = ws.check_accessible(&tree, &path, None)?;
            if info.flags.contains(flag) == value {
                return Ok(());
            }
            tree.update(&path, |info| info.flags.set(flag, value))
        })
    }

    pub fn set_derived<R: ResourceHandle + ?Sized>(&self, resource: &R, derived: bool) -> Result<(), ResourceError> {
        self.set_flag(resource, InfoFlags::DERIVED, derived)
    }

    pub fn set_team_private<R: ResourceHandle + ?Sized>(&self, resource: &R, team_private: bool) -> Result<(), ResourceError> {
        self.set_flag(resource, InfoFlags::TEAM_PRIVATE, team_private)
    }

    pub fn set_hidden<R: ResourceHandle + ?Sized>(&self, resource: &R, hidden: bool) -> Result<(), ResourceError> {
        self.set_flag(resource, InfoFlags::HIDDEN, hidden)
    }

    fn has_flag(&self, path: &ResourcePath, flag: InfoFlags, check_ancestors: bool) -> bool {
        let tree = self.tree.read();
        let depth = if check_ancestors { 2 } else { path.segment_count() };
        (depth..=path.segment_count()).any(|count| {
            tree.visible_info(&path.prefix(count))
                .map_or(false, |i| !i.is_phantom() && i.flags.contains(flag))
        })
    }

    /// Whether the resource, or with `check_ancestors` any ancestor, is derived.
    pub fn is_derived<R: ResourceHandle + ?Sized>(&self, resource: &R, check_ancestors: bool) -> bool {
        resource.path().segment_count() > 1 && self.has_flag(resource.path(), InfoFlags::DERIVED, check_ancestors)
    }

    pub fn is_hidden<R: ResourceHandle + ?Sized>(&self, resource: &R, check_ancestors: bool) -> bool {
        resource.path().segment_count() > 1 && self.has_flag(resource.path(), InfoFlags::HIDDEN, check_ancestors)
    }

    pub fn is_team_private<R: ResourceHandle + ?Sized>(&self, resource: &R) -> bool {
        resource.path().segment_count() > 1 && self.has_flag(resource.path(), InfoFlags::TEAM_PRIVATE, false)
    }

    /// Charset a container passes down: the nearest explicit setting on
    /// `path` or an ancestor, else the workspace default.
    pub(crate) fn inherited_charset(&self, tree: &ElementTree, path: &ResourcePath) -> String {
        (0..=path.segment_count())
            .rev()
            .find_map(|count| {
                tree.info(&path.prefix(count))
                    .filter(|i| !i.is_phantom())
                    .and_then(|i| i.charset.clone())
            })
            .unwrap_or_else(|| self.config.workspace.default_charset.clone())
    }

    fn file_default_charset(&self, tree: &ElementTree, path: &ResourcePath, info: &ResourceInfo) -> String {
        info.detected_charset.clone().unwrap_or_else(|| {
            let parent = path.parent().unwrap_or_else(ResourcePath::root);
            self.inherited_charset(tree, &parent)
        })
    }

    /// Effective charset: a file's explicit charset, else what its content
    /// declares, else what it inherits. For containers, their default.
    pub fn charset<R: ResourceHandle + ?Sized>(&self, resource: &R) -> Result<String, ResourceError> {
        let tree = self.tree.read();
        let path = resource.path();
        let info = self.check_accessible(&tree, path, None)?;
        Ok(match (info.kind, &info.charset) {
            (ResourceKind::File, Some(explicit)) => explicit.clone(),
            (ResourceKind::File, None) => self.file_default_charset(&tree, path, &info),
            _ => self.inherited_charset(&tree, path),
        })
    }

    /// Charset that applies when no explicit one is set on the resource.
    pub fn default_charset<R: ResourceHandle + ?Sized>(&self, resource: &R) -> Result<String, ResourceError> {
        let tree = self.tree.read();
        let path = resource.path();
        let info = self.check_accessible(&tree, path, None)?;
        Ok(match (info.kind, path.parent()) {
            (ResourceKind::File, _) => self.file_default_charset(&tree, path, &info),
            (_, Some(parent)) => self.inherited_charset(&tree, &parent),
            (_, None) => self.config.workspace.default_charset.clone(),
        })
    }

    /// The charset set on the resource itself, if any.
    pub fn explicit_charset<R: ResourceHandle + ?Sized>(&self, resource: &R) -> Result<Option<String>, ResourceError> {
        let tree = self.tree.read();
        Ok(self.check_accessible(&tree, resource.path(), None)?.charset.clone())
    }

    /// Set or clear a file's own charset.
    pub fn set_charset(&self, file: &File, charset: Option<&str>) -> Result<(), ResourceError> {
        self.store_charset(file.path(), ResourceKind::File, charset)
    }

    /// Set or clear the charset a container passes to its members. On the
    /// root this changes the workspace-wide default.
    pub fn set_default_charset<C: Container + ?Sized>(&self, container: &C, charset: Option<&str>) -> Result<(), ResourceError> {
        self.store_charset(container.path(), container.kind(), charset)
    }

    fn store_charset(&self, path: &ResourcePath, kind: ResourceKind, charset: Option<&str>) -> Result<(), ResourceError> {
        if let Some(name) = charset {
            validate_charset_name(path, name)?;
        }
        let path = path.clone();
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            let info = ws.check_accessible(&tree, &path, Some(kind))?;
            let wanted = charset.map(str::to_string);
            if info.charset == wanted {
                return Ok(());
            }
            tree.update(&path, |info| info.charset = wanted.clone())?;
            if !path.is_root() {
                let relative = super::project::project_relative(&path);
                ws.update_description(&mut tree, &path.prefix(1), |d| match &wanted {
                    Some(charset) => {
                        d.encodings.insert(relative, charset.clone());
                    }
                    None => {
                        d.encodings.remove(&relative);
                    }
                })?;
            }
            debug!(path = %path, charset = ?charset, "Charset changed");
            Ok(())
        })
    }

    /// Set or clear a persistent property. Persistent properties survive
    /// save and restore and are copied by copy.
    pub fn set_persistent_property<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        name: QualifiedName,
        value: Option<&str>,
    ) -> Result<(), ResourceError> {
        self.edit_properties(resource.path(), |info| &mut info.persistent_properties, name, value)
    }

    pub fn persistent_property<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        name: &QualifiedName,
    ) -> Result<Option<String>, ResourceError> {
        Ok(self.properties(resource.path(), |info| &info.persistent_properties)?.remove(name))
    }

    pub fn persistent_properties<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
    ) -> Result<BTreeMap<QualifiedName, String>, ResourceError> {
        self.properties(resource.path(), |info| &info.persistent_properties)
    }

    /// Set or clear a session property, which lives only as long as the
    /// workspace value.
    pub fn set_session_property<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        name: QualifiedName,
        value: Option<&str>,
    ) -> Result<(), ResourceError> {
        self.edit_properties(resource.path(), |info| &mut info.session_properties, name, value)
    }

    pub fn session_property<R: ResourceHandle + ?Sized>(
        &self,
        resource: &R,
        name: &QualifiedName,
    ) -> Result<Option<String>, ResourceError> {
        Ok(self.properties(resource.path(), |info| &info.session_properties)?.remove(name))
    }

    fn properties(
        &self,
        path: &ResourcePath,
        field: fn(&ResourceInfo) -> &Option<Arc<PropertyMap>>,
    ) -> Result<PropertyMap, ResourceError> {
        let tree = self.tree.read();
        let info = self.check_accessible(&tree, path, None)?;
        Ok(field(&info).as_deref().cloned().unwrap_or_default())
    }

    fn edit_properties(
        &self,
        path: &ResourcePath,
        field: fn(&mut ResourceInfo) -> &mut Option<Arc<PropertyMap>>,
        name: QualifiedName,
        value: Option<&str>,
    ) -> Result<(), ResourceError> {
        let path = path.clone();
        self.run(SchedulingRule::for_path(&path), false, &NullMonitor, |ws| {
            let mut tree = ws.write_tree(&path)?;
            ws.check_accessible(&tree, &path, None)?;
            tree.update(&path, |info| {
                let slot = field(info);
                let mut map = slot.as_deref().cloned().unwrap_or_default();
                match value {
                    Some(value) => {
                        map.insert(name, value.to_string());
                    }
                    None => {
                        map.remove(&name);
                    }
                }
                *slot = (!map.is_empty()).then(|| Arc::new(map));
            })
        })
    }

    /// Saved states of a file, most recent first.
    pub fn file_history(&self, file: &File) -> Vec<HistoryState> {
        let mut states = self.history.lock().get(file.path()).cloned().unwrap_or_default();
        states.reverse();
        states
    }

    pub fn clear_history(&self, file: &File) {
        self.history.lock().remove(file.path());
    }

    /// Save the current local contents of `path` in its history. A file
    /// that cannot be read is skipped.
    pub(crate) fn remember(&self, path: &ResourcePath, stamp: i64, location: &std::path::Path) {
        let contents = match self.store.read(location) {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = %path, error = %err, "Skipping history for unreadable file");
                return;
            }
        };
        let mut history = self.history.lock();
        let states = history.entry(path.clone()).or_default();
        states.push(HistoryState {
            stamp,
            contents,
            saved_at: Utc::now(),
        });
        if states.len() > MAX_HISTORY_STATES {
            states.remove(0);
        }
    }

    /// Save every local file at or below `path`.
    pub(crate) fn remember_subtree(&self, tree: &ElementTree, path: &ResourcePath) {
        let walked = tree.walk(path, |current, info| {
            if info.is_phantom() || (info.is_link() && current != path) {
                return Ok(Visit::SkipChildren);
            }
            if info.kind == ResourceKind::File && info.local_exists() {
                if let Some(location) = self.location_in(tree, current) {
                    self.remember(current, info.modification_stamp, &location);
                }
            }
            Ok(Visit::Continue)
        });
        if let Err(err) = walked {
            debug!(error = %err, "History walk stopped early");
        }
    }
}

fn validate_charset_name(path: &ResourcePath, name: &str) -> Result<(), ResourceError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+'));
    if valid {
        Ok(())
    } else {
        Err(ResourceError::invalid(path, format!("'{}' is not a valid charset name", name)))
    }
}
