//! Workspace config file source: .canopy/config.toml and .canopy/{env}.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;

/// Directory under the workspace root holding its configuration.
pub const CONFIG_DIR: &str = ".canopy";

/// Add workspace config files to the builder.
/// Precedence: .canopy/config.toml (base) then .canopy/{CANOPY_ENV}.toml.
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let config_dir = workspace_root.join(CONFIG_DIR);
    let env_name = std::env::var("CANOPY_ENV").unwrap_or_else(|_| "development".to_string());

    let base_config_path = config_dir.join("config.toml");
    if base_config_path.exists() {
        builder = builder.add_source(File::from(base_config_path).required(false));
    }

    let env_config_path = config_dir.join(format!("{}.toml", env_name));
    if env_config_path.exists() {
        builder = builder.add_source(File::from(env_config_path).required(false));
    }

    Ok(builder)
}
