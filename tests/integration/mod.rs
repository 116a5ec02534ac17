//! Integration tests for the workspace resource tree

mod test_utils;

mod filters;
mod links;
mod local_workspace;
mod markers;
mod namespace;
mod notifications;
mod persistence;
mod sync_phantoms;
