//! Merge rules: defaults first, later sources override earlier ones.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with the built-in defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("workspace.location", ".")?
        .set_default("workspace.default_charset", "UTF-8")?
        .set_default("workspace.auto_build", false)?
        .set_default("workspace.description_file", ".project")?
        .set_default("workspace.case_sensitive", true)?
        .set_default("refresh.follow_symlinks", true)?
        .set_default("refresh.include_dot_entries", true)?
        .set_default("save.store_path", ".canopy/save.db")
}
