//! CLI route: single route table and run context. Dispatches to the
//! workspace and to presentation.

use crate::cli::output::{format_filters, format_markers, format_members, format_summary, format_tree};
use crate::cli::parse::{Commands, DepthArg, FilterCommands, OutputFormat, SyncCommands};
use crate::config::ConfigLoader;
use crate::error::ResourceError;
use crate::events::{ChannelListener, EventMask, OwnedEvent};
use crate::filter::{FilterType, MatcherDescription};
use crate::monitor::NullMonitor;
use crate::resource::{CreateFlags, MemberFlags, Project, Resource, ResourceHandle, UpdateFlags, WorkspaceRoot};
use crate::store::{LocalFileStore, SledSaveStore};
use crate::tree::path::ResourcePath;
use crate::types::{Depth, QualifiedName, ResourceKind};
use crate::workspace::{ResourceSummary, Workspace};
use anyhow::{anyhow, bail, Context};
use notify::{RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

impl From<DepthArg> for Depth {
    fn from(depth: DepthArg) -> Self {
        match depth {
            DepthArg::Zero => Depth::Zero,
            DepthArg::One => Depth::One,
            DepthArg::Infinite => Depth::Infinite,
        }
    }
}

/// Runtime context for CLI execution: the workspace over the local file
/// system, with its projects adopted and saved state restored.
pub struct RunContext {
    workspace: Arc<Workspace>,
    workspace_root: PathBuf,
    save_store: SledSaveStore,
}

impl RunContext {
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let workspace_root = dunce::canonicalize(&workspace_root)
            .with_context(|| format!("Workspace directory {} is not accessible", workspace_root.display()))?;
        let mut config = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        config.workspace.location = workspace_root.clone();

        let store_path = config.store_path();
        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let save_store = SledSaveStore::new(&store_path)?;

        let file_store = Arc::new(LocalFileStore::new(config.refresh.follow_symlinks));
        let workspace = Arc::new(Workspace::new(config, file_store)?);
        let context = Self {
            workspace,
            workspace_root,
            save_store,
        };
        context.adopt_projects()?;
        let restored = context.workspace.restore(&context.save_store)?;
        debug!(records = restored, "Saved state restored");
        Ok(context)
    }

    /// Every directory below the workspace root holding a description
    /// file becomes an open project.
    fn adopt_projects(&self) -> anyhow::Result<()> {
        let description_file = &self.workspace.config().workspace.description_file;
        let mut adopted = 0;
        for entry in walkdir::WalkDir::new(&self.workspace_root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_dir() || !entry.path().join(description_file).is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let project = match WorkspaceRoot.project(&name) {
                Ok(project) => project,
                Err(err) => {
                    warn!(name = %name, error = %err, "Skipping directory with an invalid project name");
                    continue;
                }
            };
            if !self.workspace.exists(&project) {
                self.workspace.create_project(&project, None)?;
            }
            self.workspace.open_project(&project, &NullMonitor)?;
            adopted += 1;
        }
        info!(projects = adopted, root = %self.workspace_root.display(), "Projects adopted");
        Ok(())
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> anyhow::Result<String> {
        let output = match command {
            Commands::Tree { path, all, format } => self.handle_tree(path, *all, *format),
            Commands::Members { path, all, format } => self.handle_members(path, *all, *format),
            Commands::Info { path, format } => self.handle_info(path, *format),
            Commands::Refresh { path, depth } => self.handle_refresh(path, (*depth).into()),
            Commands::Charset { path, set, clear } => self.handle_charset(path, set.as_deref(), *clear),
            Commands::Filter { command } => self.handle_filter_command(command),
            Commands::Link {
                path,
                target,
                folder,
                allow_missing,
            } => self.handle_link(path, target, *folder, *allow_missing),
            Commands::Delete {
                path,
                yes,
                force,
                keep_history,
            } => self.handle_delete(path, *yes, *force, *keep_history),
            Commands::Sync { command } => self.handle_sync_command(command),
            Commands::Markers {
                path,
                marker_type,
                depth,
            } => self.handle_markers(path, marker_type.as_deref(), (*depth).into()),
            Commands::Watch { debounce_ms } => self.handle_watch(*debounce_ms),
        }?;
        self.persist()?;
        Ok(output)
    }

    fn persist(&self) -> anyhow::Result<()> {
        let records = self.workspace.save(&self.save_store)?;
        self.save_store.flush()?;
        debug!(records, "Workspace state saved");
        Ok(())
    }

    /// Handle for an existing resource at a workspace path.
    fn resolve(&self, path: &str) -> anyhow::Result<Resource> {
        let parsed = ResourcePath::parse(path)?;
        self.workspace
            .find_member(&WorkspaceRoot, path)
            .ok_or_else(|| anyhow!(ResourceError::NotFound(parsed)))
    }

    fn summaries(&self, resource: &Resource, depth: Depth, flags: MemberFlags) -> anyhow::Result<Vec<ResourceSummary>> {
        let mut summaries = Vec::new();
        self.workspace.accept(resource, depth, flags, &NullMonitor, |visited| {
            summaries.push(self.workspace.resource_info(visited)?);
            Ok(true)
        })?;
        Ok(summaries)
    }

    fn member_flags(all: bool) -> MemberFlags {
        if all {
            MemberFlags::all()
        } else {
            MemberFlags::empty()
        }
    }

    fn handle_tree(&self, path: &str, all: bool, format: OutputFormat) -> anyhow::Result<String> {
        let resource = self.resolve(path)?;
        let entries = self.summaries(&resource, Depth::Infinite, Self::member_flags(all))?;
        format_tree(&entries, format == OutputFormat::Json)
    }

    fn handle_members(&self, path: &str, all: bool, format: OutputFormat) -> anyhow::Result<String> {
        let resource = self.resolve(path)?;
        let mut entries = self.summaries(&resource, Depth::One, Self::member_flags(all))?;
        // the container itself comes first
        entries.remove(0);
        format_members(&entries, format == OutputFormat::Json)
    }

    fn handle_info(&self, path: &str, format: OutputFormat) -> anyhow::Result<String> {
        let resource = self.resolve(path)?;
        let summary = self.workspace.resource_info(&resource)?;
        let charset = self.workspace.charset(&resource).ok();
        format_summary(&summary, charset.as_deref(), format == OutputFormat::Json)
    }

    /// Run `action` and render the change notification it produced.
    fn with_changes<F>(&self, action: F) -> anyhow::Result<String>
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        let (listener, receiver) = ChannelListener::new_pair();
        let id = self.workspace.add_resource_change_listener(listener, EventMask::POST_CHANGE);
        let outcome = action();
        self.workspace.remove_resource_change_listener(id);
        outcome?;
        Ok(render_changes(&receiver))
    }

    fn handle_refresh(&self, path: &str, depth: Depth) -> anyhow::Result<String> {
        let resource = self.resolve(path)?;
        self.with_changes(|| Ok(self.workspace.refresh_local(&resource, depth, &NullMonitor)?))
    }

    fn handle_charset(&self, path: &str, set: Option<&str>, clear: bool) -> anyhow::Result<String> {
        let resource = self.resolve(path)?;
        if set.is_some() || clear {
            match &resource {
                Resource::File(file) => self.workspace.set_charset(file, set)?,
                Resource::Folder(folder) => self.workspace.set_default_charset(folder, set)?,
                Resource::Project(project) => self.workspace.set_default_charset(project, set)?,
                Resource::Root(root) => self.workspace.set_default_charset(root, set)?,
            }
        }
        let effective = self.workspace.charset(&resource)?;
        let explicit = self.workspace.explicit_charset(&resource)?;
        Ok(match explicit {
            Some(explicit) => format!("{} (explicit: {})", effective, explicit),
            None => format!("{} (inherited)", effective),
        })
    }

    fn handle_filter_command(&self, command: &FilterCommands) -> anyhow::Result<String> {
        match command {
            FilterCommands::Add {
                container,
                pattern,
                exclude,
                files,
                folders,
                inheritable,
            } => {
                let mut filter_type = if *exclude {
                    FilterType::EXCLUDE_ALL
                } else {
                    FilterType::INCLUDE_ONLY
                };
                filter_type.set(FilterType::FILES, *files);
                filter_type.set(FilterType::FOLDERS, *folders);
                filter_type.set(FilterType::INHERITABLE, *inheritable);
                let matcher = MatcherDescription::Regex(pattern.clone());
                let resource = self.resolve(container)?;
                let mut id = 0;
                let changes = self.with_changes(|| {
                    id = match &resource {
                        Resource::Project(project) => {
                            self.workspace.create_filter(project, filter_type, matcher, &NullMonitor)?
                        }
                        Resource::Folder(folder) => {
                            self.workspace.create_filter(folder, filter_type, matcher, &NullMonitor)?
                        }
                        other => bail!("cannot attach a filter to {}", other),
                    };
                    Ok(())
                })?;
                Ok(format!("Created filter {}\n{}", id, changes).trim_end().to_string())
            }
            FilterCommands::List { container, format } => {
                let filters = match self.resolve(container)? {
                    Resource::Project(project) => self.workspace.filters(&project)?,
                    Resource::Folder(folder) => self.workspace.filters(&folder)?,
                    _ => Vec::new(),
                };
                format_filters(&filters, *format == OutputFormat::Json)
            }
            FilterCommands::Remove { container, id } => {
                let resource = self.resolve(container)?;
                self.with_changes(|| {
                    match &resource {
                        Resource::Project(project) => self.workspace.remove_filter(project, *id, &NullMonitor)?,
                        Resource::Folder(folder) => self.workspace.remove_filter(folder, *id, &NullMonitor)?,
                        other => bail!("{} has no filters", other),
                    }
                    Ok(())
                })
            }
        }
    }

    fn handle_link(&self, path: &str, target: &Path, folder: bool, allow_missing: bool) -> anyhow::Result<String> {
        let path = ResourcePath::parse(path)?;
        let kind = if folder { ResourceKind::Folder } else { ResourceKind::File };
        let link = Resource::from_kind(path, kind);
        let target = if target.is_absolute() {
            target.to_path_buf()
        } else {
            std::env::current_dir()?.join(target)
        };
        let mut flags = CreateFlags::empty();
        flags.set(CreateFlags::ALLOW_MISSING_LOCAL, allow_missing);
        self.with_changes(|| Ok(self.workspace.create_link(&link, &target, flags)?))
    }

    fn handle_delete(&self, path: &str, yes: bool, force: bool, keep_history: bool) -> anyhow::Result<String> {
        let resource = self.resolve(path)?;
        if !yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!("Delete {} and its local content?", resource))
                .default(false)
                .interact()
                .context("Failed to get user input")?;
            if !confirmed {
                return Ok("Deletion cancelled".to_string());
            }
        }
        let mut flags = UpdateFlags::empty();
        flags.set(UpdateFlags::FORCE, force);
        flags.set(UpdateFlags::KEEP_HISTORY, keep_history);
        self.with_changes(|| Ok(self.workspace.delete(&resource, flags, &NullMonitor)?))
    }

    fn handle_sync_command(&self, command: &SyncCommands) -> anyhow::Result<String> {
        match command {
            SyncCommands::Get { partner, path } => {
                let partner = QualifiedName::parse(partner);
                self.workspace.register_sync_partner(partner.clone());
                let resource = Resource::from_kind(ResourcePath::parse(path)?, ResourceKind::File);
                Ok(match self.workspace.sync_info(&partner, &resource)? {
                    Some(bytes) => hex::encode(bytes),
                    None => format!("No sync info for {} on {}", partner, path),
                })
            }
            SyncCommands::Set {
                partner,
                path,
                hex: value,
                clear,
                folder,
            } => {
                let partner = QualifiedName::parse(partner);
                self.workspace.register_sync_partner(partner.clone());
                let bytes = match (value, clear) {
                    (_, true) => None,
                    (Some(value), false) => Some(hex::decode(value).context("Sync info must be a hex string")?),
                    (None, false) => bail!("either a hex value or --clear is required"),
                };
                let resource = match self.resolve(path) {
                    Ok(resource) => resource,
                    Err(_) => {
                        let kind = if *folder { ResourceKind::Folder } else { ResourceKind::File };
                        Resource::from_kind(ResourcePath::parse(path)?, kind)
                    }
                };
                self.with_changes(|| Ok(self.workspace.set_sync_info(&partner, &resource, bytes.as_deref())?))
            }
        }
    }

    fn handle_markers(&self, path: &str, marker_type: Option<&str>, depth: Depth) -> anyhow::Result<String> {
        let resource = self.resolve(path)?;
        let markers = self.workspace.find_markers(&resource, marker_type, true, depth)?;
        Ok(format_markers(&markers))
    }

    /// Refresh projects touched by file-system events until interrupted.
    fn handle_watch(&self, debounce_ms: u64) -> anyhow::Result<String> {
        let (sender, events) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |event| {
            if sender.send(event).is_err() {
                debug!("Watch channel closed");
            }
        })?;
        watcher.watch(&self.workspace_root, RecursiveMode::Recursive)?;
        info!(root = %self.workspace_root.display(), debounce_ms, "Watching workspace");

        let (listener, changes) = ChannelListener::new_pair();
        let id = self.workspace.add_resource_change_listener(listener, EventMask::POST_CHANGE);
        let debounce = Duration::from_millis(debounce_ms);
        let outcome = loop {
            let first = match events.recv() {
                Ok(event) => event,
                Err(_) => break Ok(()),
            };
            let mut batch = vec![first];
            loop {
                match events.recv_timeout(debounce) {
                    Ok(event) => batch.push(event),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            let projects = self.touched_projects(batch);
            for project in &projects {
                if let Err(err) = self.workspace.refresh_local(project, Depth::Infinite, &NullMonitor) {
                    warn!(project = project.name(), error = %err, "Refresh after file-system change failed");
                }
            }
            let rendered = render_changes(&changes);
            if !rendered.is_empty() {
                println!("{}", rendered);
            }
            if let Err(err) = self.persist() {
                break Err(err);
            }
        };
        self.workspace.remove_resource_change_listener(id);
        outcome.map(|_| "Watch stopped".to_string())
    }

    fn touched_projects(&self, batch: Vec<notify::Result<notify::Event>>) -> BTreeSet<Project> {
        let store_dir = self.workspace.config().store_path();
        let mut projects = BTreeSet::new();
        for event in batch {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "File-system watch error");
                    continue;
                }
            };
            for path in event.paths {
                if store_dir.parent().map_or(false, |dir| path.starts_with(dir)) {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.workspace_root) else {
                    continue;
                };
                let Some(name) = relative.components().next() else {
                    continue;
                };
                if let Ok(project) = WorkspaceRoot.project(&name.as_os_str().to_string_lossy()) {
                    if self.workspace.exists(&project) {
                        projects.insert(project);
                    }
                }
            }
        }
        projects
    }
}

/// Deltas received so far, one block per notification.
fn render_changes(receiver: &Receiver<OwnedEvent>) -> String {
    receiver
        .try_iter()
        .filter_map(|event| event.delta)
        .map(|delta| delta.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
