//! CLI parse: clap types for Canopy. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Canopy CLI - workspace resource tree
#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Inspect and maintain a workspace resource tree")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace directory; each subdirectory with a description file is a project
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DepthArg {
    Zero,
    One,
    Infinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the resource tree below a path
    Tree {
        /// Workspace path, e.g. /P/src
        #[arg(default_value = "/")]
        path: String,
        /// Include phantoms, hidden and team-private resources
        #[arg(long)]
        all: bool,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// List the members of a container
    Members {
        #[arg(default_value = "/")]
        path: String,
        #[arg(long)]
        all: bool,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show the state of one resource
    Info {
        path: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Reconcile the tree with the file system and print the resulting changes
    Refresh {
        #[arg(default_value = "/")]
        path: String,
        #[arg(long, value_enum, default_value = "infinite")]
        depth: DepthArg,
    },
    /// Show or change a charset
    Charset {
        path: String,
        /// Set an explicit charset (file) or default charset (container)
        #[arg(long, conflicts_with = "clear")]
        set: Option<String>,
        /// Remove the explicit setting
        #[arg(long)]
        clear: bool,
    },
    /// Manage resource filters
    Filter {
        #[command(subcommand)]
        command: FilterCommands,
    },
    /// Create a linked file or folder
    Link {
        /// Workspace path of the new link
        path: String,
        /// File-system location the link points at
        target: PathBuf,
        /// Create a folder link (default: file link)
        #[arg(long)]
        folder: bool,
        /// Create the link even if the target does not exist yet
        #[arg(long)]
        allow_missing: bool,
    },
    /// Delete a resource and its local content
    Delete {
        path: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
        /// Delete even when the file system is out of sync
        #[arg(long)]
        force: bool,
        /// Keep replaced file contents in the local history
        #[arg(long)]
        keep_history: bool,
    },
    /// Read or write sync partner info
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// List markers below a path
    Markers {
        #[arg(default_value = "/")]
        path: String,
        /// Marker type; subtypes are included
        #[arg(long = "type")]
        marker_type: Option<String>,
        #[arg(long, value_enum, default_value = "infinite")]
        depth: DepthArg,
    },
    /// Watch the workspace and refresh on file-system changes
    Watch {
        /// Debounce window in milliseconds
        #[arg(long, default_value = "200")]
        debounce_ms: u64,
    },
}

#[derive(Subcommand)]
pub enum FilterCommands {
    /// Attach a filter to a container
    Add {
        container: String,
        /// Regular expression matched against whole member names
        pattern: String,
        /// Hide matching members (default: show only matching members)
        #[arg(long)]
        exclude: bool,
        /// Apply to files only
        #[arg(long, conflicts_with = "folders")]
        files: bool,
        /// Apply to folders only
        #[arg(long)]
        folders: bool,
        /// Also apply to every descendant container
        #[arg(long)]
        inheritable: bool,
    },
    /// List the filters of a container
    List {
        container: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Remove a filter by id
    Remove { container: String, id: u64 },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Print a partner's bytes as hex
    Get {
        /// Partner name, `qualifier:local`
        partner: String,
        path: String,
    },
    /// Set (hex) or clear a partner's bytes
    Set {
        partner: String,
        path: String,
        /// Bytes as a hex string
        #[arg(required_unless_present = "clear")]
        hex: Option<String>,
        #[arg(long)]
        clear: bool,
        /// Kind of resource to create a phantom for when the path is missing
        #[arg(long)]
        folder: bool,
    },
}
