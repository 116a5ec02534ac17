//! Build participant hook
//!
//! The engine calls the registered participant once per broadcast in
//! which a build was requested (or auto-build is on) and something
//! changed. Mutations the participant makes are folded into the
//! notification of the same broadcast.

use crate::delta::ResourceDelta;
use crate::error::ResourceError;
use crate::monitor::ProgressMonitor;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildKind {
    /// Requested explicitly by the operation that ended.
    Incremental,
    /// Triggered because auto-build is enabled.
    Auto,
}

impl BuildKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildKind::Incremental => "incremental",
            BuildKind::Auto => "auto",
        }
    }
}

pub trait BuildParticipant: Send + Sync {
    /// Run a build over the changes described by `delta`.
    fn build(
        &self,
        workspace: &Workspace,
        kind: BuildKind,
        delta: &ResourceDelta,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), ResourceError>;
}

impl<F> BuildParticipant for F
where
    F: Fn(&Workspace, BuildKind, &ResourceDelta) -> Result<(), ResourceError> + Send + Sync,
{
    fn build(
        &self,
        workspace: &Workspace,
        kind: BuildKind,
        delta: &ResourceDelta,
        _monitor: &dyn ProgressMonitor,
    ) -> Result<(), ResourceError> {
        self(workspace, kind, delta)
    }
}
