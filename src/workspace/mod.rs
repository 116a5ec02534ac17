//! The workspace: owner of the resource tree and entry point of every
//! operation on it.
//!
//! API groups live in submodules: resource creation and deletion,
//! moves and copies, project lifecycle, attributes and properties,
//! filters, markers, and read-only queries.

mod attributes;
mod filters;
mod markers;
mod project;
mod query;
mod resources;
mod transfer;

pub use attributes::HistoryState;
pub use query::ResourceSummary;
pub(crate) use resources::PhantomPolicy;

use crate::build::BuildParticipant;
use crate::charset::{ContentType, ContentTypeRegistry};
use crate::config::{ConfigLoader, WorkspaceConfig};
use crate::error::ResourceError;
use crate::events::{EventMask, ListenerId, ListenerRegistry, ResourceChangeListener};
use crate::location::AliasIndex;
use crate::markers::MarkerTypeRegistry;
use crate::description::NatureRegistry;
use crate::operation::OperationManager;
use crate::resource::WorkspaceRoot;
use crate::rules::RuleManager;
use crate::store::{FileStore, LocalFileStore};
use crate::tree::element::{ElementTree, Snapshot};
use crate::tree::info::{InfoFlags, ResourceInfo};
use crate::tree::path::ResourcePath;
use crate::types::{MarkerId, NodeId, QualifiedName, ResourceKind};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

pub struct Workspace {
    pub(crate) config: WorkspaceConfig,
    pub(crate) store: Arc<dyn FileStore>,
    pub(crate) tree: RwLock<ElementTree>,
    /// Tree version listeners were last notified about.
    pub(crate) baseline: Mutex<Snapshot>,
    pub(crate) operations: OperationManager,
    pub(crate) rules: RuleManager,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) build_participant: RwLock<Option<Arc<dyn BuildParticipant>>>,
    pub(crate) content_types: RwLock<ContentTypeRegistry>,
    pub(crate) marker_types: RwLock<MarkerTypeRegistry>,
    pub(crate) natures: RwLock<NatureRegistry>,
    pub(crate) sync_partners: RwLock<BTreeSet<QualifiedName>>,
    pub(crate) history: Mutex<HashMap<ResourcePath, Vec<HistoryState>>>,
    pub(crate) aliases: Mutex<Option<Arc<AliasIndex>>>,
    next_node: AtomicU64,
    pub(crate) next_marker: AtomicU64,
    next_filter: AtomicU64,
    next_stamp: AtomicI64,
    next_content: AtomicU64,
}

impl Workspace {
    /// Create an empty workspace over `store`.
    pub fn new(config: WorkspaceConfig, store: Arc<dyn FileStore>) -> Result<Self, ResourceError> {
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ResourceError::Config(messages.join("; "))
        })?;

        let mut root = ResourceInfo::new(ResourceKind::Root, NodeId(0));
        root.flags = InfoFlags::OPEN | InfoFlags::LOCAL_EXISTS;
        let mut tree = ElementTree::new(root);
        let baseline = tree.snapshot();

        info!(
            location = %config.workspace.location.display(),
            auto_build = config.workspace.auto_build,
            "Workspace created"
        );
        Ok(Self {
            config,
            store,
            tree: RwLock::new(tree),
            baseline: Mutex::new(baseline),
            operations: OperationManager::default(),
            rules: RuleManager::new(),
            listeners: ListenerRegistry::default(),
            build_participant: RwLock::new(None),
            content_types: RwLock::new(ContentTypeRegistry::default()),
            marker_types: RwLock::new(MarkerTypeRegistry::default()),
            natures: RwLock::new(NatureRegistry::default()),
            sync_partners: RwLock::new(BTreeSet::new()),
            history: Mutex::new(HashMap::new()),
            aliases: Mutex::new(None),
            next_node: AtomicU64::new(1),
            next_marker: AtomicU64::new(1),
            next_filter: AtomicU64::new(1),
            next_stamp: AtomicI64::new(1),
            next_content: AtomicU64::new(1),
        })
    }

    /// Workspace over the local file system at `location`, configured
    /// from its config files and environment.
    pub fn open(location: &Path) -> Result<Self, ResourceError> {
        let config = ConfigLoader::load(location)?;
        let store = Arc::new(LocalFileStore::new(config.refresh.follow_symlinks));
        Self::new(config, store)
    }

    pub fn root(&self) -> WorkspaceRoot {
        WorkspaceRoot
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn file_store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    /// Subscribe `listener` to the phases in `mask`.
    pub fn add_resource_change_listener<L>(&self, listener: L, mask: EventMask) -> ListenerId
    where
        L: ResourceChangeListener + 'static,
    {
        self.listeners.add(Arc::new(listener), mask)
    }

    pub fn add_shared_listener(&self, listener: Arc<dyn ResourceChangeListener>, mask: EventMask) -> ListenerId {
        self.listeners.add(listener, mask)
    }

    pub fn remove_resource_change_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Install the participant run by build requests and auto-build.
    pub fn set_build_participant(&self, participant: Option<Arc<dyn BuildParticipant>>) {
        *self.build_participant.write() = participant;
    }

    pub fn register_content_type(&self, content_type: ContentType) {
        self.content_types.write().register(content_type);
    }

    pub fn register_marker_type(&self, marker_type: &str, supertypes: &[&str]) {
        self.marker_types.write().register(marker_type, supertypes);
    }

    pub fn register_nature(&self, nature: &str, requires: &[&str]) {
        self.natures.write().register(nature, requires);
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        NodeId(self.next_node.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn next_marker_id(&self) -> MarkerId {
        self.next_marker.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn next_filter_id(&self) -> u64 {
        self.next_filter.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn next_stamp(&self) -> i64 {
        self.next_stamp.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn next_content_id(&self) -> u64 {
        self.next_content.fetch_add(1, Ordering::SeqCst)
    }

    /// Write access to the tree for a mutation of `path`. Fails outside
    /// an operation and while the tree is locked for notification.
    pub(crate) fn write_tree(&self, path: &ResourcePath) -> Result<RwLockWriteGuard<'_, ElementTree>, ResourceError> {
        self.operations.check_writable(path)?;
        Ok(self.tree.write())
    }

    /// Charset implied by a file's name and content.
    pub(crate) fn detect_charset(&self, name: &str, contents: &[u8]) -> Option<String> {
        self.content_types.read().detect(name, contents)
    }

    /// Info of an existing resource, honoring closed projects.
    pub(crate) fn check_accessible(
        &self,
        tree: &ElementTree,
        path: &ResourcePath,
        kind: Option<ResourceKind>,
    ) -> Result<Arc<ResourceInfo>, ResourceError> {
        if path.segment_count() > 1 {
            let project = path.prefix(1);
            match tree.info(&project) {
                Some(info) if info.is_phantom() => return Err(ResourceError::NotFound(path.clone())),
                Some(info) if !info.is_open() => return Err(ResourceError::ProjectClosed(project)),
                Some(_) => {}
                None => return Err(ResourceError::NotFound(path.clone())),
            }
        }
        let info = tree
            .visible_info(path)
            .filter(|i| !i.is_phantom())
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(path.clone()))?;
        match kind {
            Some(kind) if info.kind != kind => Err(ResourceError::NotFound(path.clone())),
            _ => Ok(info),
        }
    }

    /// Info of the open container that will hold a new member at `path`.
    pub(crate) fn check_parent(&self, tree: &ElementTree, path: &ResourcePath) -> Result<Arc<ResourceInfo>, ResourceError> {
        let parent = path
            .parent()
            .ok_or_else(|| ResourceError::invalid(path, "the workspace root has no parent"))?;
        let info = self.check_accessible(tree, &parent, None)?;
        if !info.kind.is_container() {
            return Err(ResourceError::NotFound(parent));
        }
        if parent.segment_count() == 1 && !info.is_open() {
            return Err(ResourceError::ProjectClosed(parent));
        }
        Ok(info)
    }

    /// Fails if a live resource occupies `path`, or a case variant of it
    /// when names are case-insensitive.
    pub(crate) fn check_absent(&self, tree: &ElementTree, path: &ResourcePath) -> Result<(), ResourceError> {
        if tree.info(path).map_or(false, |i| !i.is_phantom()) {
            return Err(ResourceError::AlreadyExists(path.clone()));
        }
        if self.config.workspace.case_sensitive {
            return Ok(());
        }
        let (Some(parent), Some(name)) = (path.parent(), path.last_segment()) else {
            return Ok(());
        };
        let wanted = name.to_lowercase();
        for (sibling, info) in tree.children(&parent) {
            if !info.is_phantom() && sibling != name && sibling.to_lowercase() == wanted {
                return Err(ResourceError::AlreadyExists(parent.append(&sibling)));
            }
        }
        Ok(())
    }

    /// Fails if `path` is at or below a link whose target is missing.
    pub(crate) fn check_link_local(&self, tree: &ElementTree, path: &ResourcePath) -> Result<(), ResourceError> {
        for depth in 2..=path.segment_count() {
            let prefix = path.prefix(depth);
            if let Some(info) = tree.info(&prefix) {
                if info.is_link() && !info.local_exists() {
                    return Err(ResourceError::LinkMissingLocal {
                        path: prefix,
                        location: info.link_target.clone().unwrap_or_default(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("location", &self.config.workspace.location)
            .field("nodes", &self.tree.read().node_count())
            .finish()
    }
}
