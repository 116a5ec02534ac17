//! Property-based tests for the versioned tree and its deltas

mod model;

mod delta_merge;
mod snapshots;
