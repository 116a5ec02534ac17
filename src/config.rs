//! Configuration System
//!
//! Layered workspace configuration: built-in defaults, the global file,
//! the workspace's own files and finally `CANOPY_` environment variables.

use crate::error::ResourceError;
use crate::logging::LoggingConfig;
use crate::tree::path::validate_segment;
use config::Environment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

pub use sources::global_file::global_config_path;
pub use sources::workspace_file::CONFIG_DIR;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub workspace: WorkspaceSection,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub save: SaveConfig,
}

/// Namespace-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSection {
    /// Directory holding projects at their default location
    #[serde(default = "default_location")]
    pub location: PathBuf,

    /// Charset inherited by everything without an explicit setting
    #[serde(default = "default_charset")]
    pub default_charset: String,

    /// Run the build hook after every top-level operation
    #[serde(default)]
    pub auto_build: bool,

    /// Name of the per-project description file
    #[serde(default = "default_description_file")]
    pub description_file: String,

    /// Whether names differing only in case are distinct resources
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

fn default_location() -> PathBuf {
    PathBuf::from(".")
}

fn default_charset() -> String {
    crate::charset::UTF_8.to_string()
}

fn default_description_file() -> String {
    crate::description::DESCRIPTION_FILE.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            location: default_location(),
            default_charset: default_charset(),
            auto_build: false,
            description_file: default_description_file(),
            case_sensitive: true,
        }
    }
}

/// File-system reconciliation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_true")]
    pub follow_symlinks: bool,

    /// Whether entries whose name starts with '.' become resources.
    /// The project description file is always included.
    #[serde(default = "default_true")]
    pub include_dot_entries: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: true,
            include_dot_entries: true,
        }
    }
}

/// Marker and sync-info persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveConfig {
    /// Save database, relative to the workspace location unless absolute
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".canopy/save.db")
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Workspace(String),
    Logging(String),
    Save(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Workspace(msg) => write!(f, "Workspace: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
            ValidationError::Save(msg) => write!(f, "Save: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl WorkspaceConfig {
    /// Configuration for a workspace at `location` with default settings.
    pub fn for_location(location: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.workspace.location = location.into();
        config
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.workspace.default_charset.trim().is_empty() {
            errors.push(ValidationError::Workspace(
                "default charset cannot be empty".to_string(),
            ));
        }
        if let Err(reason) = validate_segment(&self.workspace.description_file) {
            errors.push(ValidationError::Workspace(format!(
                "description file '{}': {}",
                self.workspace.description_file, reason
            )));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }
        if self.save.store_path.as_os_str().is_empty() {
            errors.push(ValidationError::Save("store path cannot be empty".to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Save database location, resolved against the workspace location.
    pub fn store_path(&self) -> PathBuf {
        if self.save.store_path.is_absolute() {
            self.save.store_path.clone()
        } else {
            self.workspace.location.join(&self.save.store_path)
        }
    }
}

/// Loads [`WorkspaceConfig`] from every configured source.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the configuration of the workspace at `workspace_root`.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace
    /// files, `CANOPY_*` environment variables (`__` separates sections,
    /// e.g. `CANOPY_WORKSPACE__AUTO_BUILD=true`).
    pub fn load(workspace_root: &Path) -> Result<WorkspaceConfig, ResourceError> {
        let builder = merge::merge_policy::builder_with_defaults()?
            .set_override_option("workspace.location", workspace_root.to_str().map(str::to_string))?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(
            Environment::with_prefix("CANOPY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        let config: WorkspaceConfig = builder.build()?.try_deserialize()?;
        Self::checked(config)
    }

    /// Load a single TOML file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<WorkspaceConfig, ResourceError> {
        let config: WorkspaceConfig = merge::merge_policy::builder_with_defaults()?
            .add_source(config::File::from(path.to_path_buf()))
            .build()?
            .try_deserialize()?;
        Self::checked(config)
    }

    /// Defaults only.
    pub fn defaults() -> WorkspaceConfig {
        WorkspaceConfig::default()
    }

    fn checked(config: WorkspaceConfig) -> Result<WorkspaceConfig, ResourceError> {
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ResourceError::Config(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        debug!(location = %config.workspace.location.display(), "Loaded configuration");
        Ok(config)
    }
}
