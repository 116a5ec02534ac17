//! Shared test utilities for integration tests
//!
//! Every fixture runs over an in-memory file store rooted at `/ws`, so
//! tests can stage "external" file-system changes without touching disk.

use canopy::events::{ChannelListener, OwnedEvent};
use canopy::monitor::NullMonitor;
use canopy::store::{FileStore, MemoryFileStore};
use canopy::config::WorkspaceConfig;
use canopy::{EventMask, Project, ResourceDelta, ResourcePath, Workspace};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

pub const WORKSPACE_LOCATION: &str = "/ws";

pub struct Fixture {
    pub ws: Workspace,
    pub store: Arc<MemoryFileStore>,
    events: Receiver<OwnedEvent>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(WorkspaceConfig::for_location(WORKSPACE_LOCATION))
    }

    pub fn with_config(config: WorkspaceConfig) -> Self {
        let store = Arc::new(MemoryFileStore::new());
        let ws = Workspace::new(config, store.clone()).unwrap();
        let (listener, events) = ChannelListener::new_pair();
        ws.add_resource_change_listener(listener, EventMask::POST_CHANGE);
        Self { ws, store, events }
    }

    /// Create and open a project at its default location.
    pub fn project(&self, name: &str) -> Project {
        let project = self.ws.root().project(name).unwrap();
        self.ws.create_project(&project, None).unwrap();
        self.ws.open_project(&project, &NullMonitor).unwrap();
        self.drain();
        project
    }

    /// File-system location of a workspace path under the default layout.
    pub fn disk(&self, path: &str) -> PathBuf {
        Path::new(WORKSPACE_LOCATION).join(path.trim_start_matches('/'))
    }

    /// Write a file behind the workspace's back, creating parent directories.
    pub fn write_disk(&self, path: &str, contents: &[u8]) {
        let location = self.disk(path);
        if let Some(parent) = location.parent() {
            self.store.mkdir(parent, true).unwrap();
        }
        self.store.write(&location, contents).unwrap();
    }

    pub fn disk_exists(&self, path: &str) -> bool {
        self.store.fetch_info(&self.disk(path)).unwrap().exists
    }

    /// Post-change deltas delivered since the last call.
    pub fn deltas(&self) -> Vec<ResourceDelta> {
        self.events.try_iter().filter_map(|e| e.delta).collect()
    }

    /// The single delta delivered since the last call.
    pub fn single_delta(&self) -> ResourceDelta {
        let mut deltas = self.deltas();
        assert_eq!(deltas.len(), 1, "expected exactly one notification, got {:?}", deltas);
        deltas.remove(0)
    }

    pub fn drain(&self) {
        self.events.try_iter().for_each(drop);
    }
}

pub fn path(s: &str) -> ResourcePath {
    ResourcePath::parse(s).unwrap()
}
