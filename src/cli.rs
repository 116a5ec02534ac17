//! CLI domain: parse, route and output only.
//! No workspace logic; a single route table dispatches to the workspace.

mod output;
mod parse;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, DepthArg, FilterCommands, OutputFormat, SyncCommands};
pub use route::RunContext;
