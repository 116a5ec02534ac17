//! Operation bracketing and change notification
//!
//! Every mutation runs inside an operation. Operations nest per thread
//! and may run concurrently on different threads under disjoint
//! scheduling rules. When the last active operation ends, the thread
//! that ended it becomes the broadcaster: it diffs the baseline against
//! the current tree, runs the build hook if one was requested, notifies
//! listeners and advances the baseline. Other threads wait in
//! [`Workspace::begin_operation`] until the broadcast is over.

use crate::build::BuildKind;
use crate::delta::{compute_delta, merge, DiffContext, ResourceDelta};
use crate::error::ResourceError;
use crate::events::{EventPhase, ResourceChangeEvent};
use crate::monitor::ProgressMonitor;
use crate::resource::Resource;
use crate::rules::SchedulingRule;
use crate::tree::path::ResourcePath;
use crate::workspace::Workspace;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::thread::{self, ThreadId};
use std::time::Instant;
use tracing::{debug, info_span, trace, warn};

/// What the caller of [`OperationManager::exit`] has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    /// The thread is still inside an operation.
    Nested,
    /// Other operations are still running; they will notify.
    Idle,
    /// This thread must broadcast.
    Broadcast,
}

#[derive(Debug, Default)]
struct OperationState {
    depths: HashMap<ThreadId, usize>,
    active: usize,
    broadcaster: Option<ThreadId>,
    locked: Option<(ThreadId, EventPhase)>,
    build_requested: bool,
}

#[derive(Debug, Default)]
pub(crate) struct OperationManager {
    state: Mutex<OperationState>,
    quiet: Condvar,
}

impl OperationManager {
    /// Enter an operation on the current thread. Returns the new depth.
    pub fn enter(&self) -> Result<usize, ResourceError> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if let Some((owner, phase)) = state.locked {
            if owner == me {
                return Err(ResourceError::TreeLocked(phase.as_str()));
            }
        }
        while state.broadcaster.map_or(false, |owner| owner != me) {
            self.quiet.wait(&mut state);
        }
        let broadcasting = state.broadcaster == Some(me);
        let depth = {
            let depth = state.depths.entry(me).or_insert(0);
            *depth += 1;
            *depth
        };
        if depth == 1 && !broadcasting {
            state.active += 1;
        }
        Ok(depth)
    }

    pub fn exit(&self, build: bool) -> Result<Exit, ResourceError> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        let remaining = match state.depths.get_mut(&me) {
            Some(depth) => {
                *depth -= 1;
                *depth
            }
            None => return Err(ResourceError::NotInOperation(ResourcePath::root())),
        };
        state.build_requested |= build;
        if remaining > 0 {
            return Ok(Exit::Nested);
        }
        state.depths.remove(&me);
        if state.broadcaster == Some(me) {
            return Ok(Exit::Nested);
        }
        state.active = state.active.saturating_sub(1);
        if state.active == 0 && state.broadcaster.is_none() {
            state.broadcaster = Some(me);
            Ok(Exit::Broadcast)
        } else {
            Ok(Exit::Idle)
        }
    }

    /// Consume the build request accumulated since the last broadcast.
    pub fn take_build_request(&self) -> bool {
        std::mem::take(&mut self.state.lock().build_requested)
    }

    pub fn finish_broadcast(&self) {
        let mut state = self.state.lock();
        state.broadcaster = None;
        self.quiet.notify_all();
    }

    pub fn depth(&self) -> usize {
        let me = thread::current().id();
        self.state.lock().depths.get(&me).copied().unwrap_or(0)
    }

    /// Fails unless the current thread may modify the tree.
    pub fn check_writable(&self, path: &ResourcePath) -> Result<(), ResourceError> {
        let me = thread::current().id();
        let state = self.state.lock();
        if let Some((owner, phase)) = state.locked {
            if owner == me {
                return Err(ResourceError::TreeLocked(phase.as_str()));
            }
        }
        if state.depths.get(&me).copied().unwrap_or(0) == 0 {
            return Err(ResourceError::NotInOperation(path.clone()));
        }
        Ok(())
    }

    /// Forbid modifications from the current thread until the guard drops.
    pub fn lock_tree(&self, phase: EventPhase) -> TreeLockGuard<'_> {
        let me = thread::current().id();
        let previous = self.state.lock().locked.replace((me, phase));
        TreeLockGuard {
            manager: self,
            previous,
        }
    }
}

pub(crate) struct TreeLockGuard<'a> {
    manager: &'a OperationManager,
    previous: Option<(ThreadId, EventPhase)>,
}

impl Drop for TreeLockGuard<'_> {
    fn drop(&mut self) {
        self.manager.state.lock().locked = self.previous.take();
    }
}

/// Ends the operation it was created for, also on unwind.
struct OperationGuard<'a> {
    workspace: &'a Workspace,
    build: bool,
    monitor: &'a dyn ProgressMonitor,
    ended: bool,
}

impl OperationGuard<'_> {
    fn end(mut self) -> Result<(), ResourceError> {
        self.ended = true;
        self.workspace.end_operation(self.build, self.monitor)
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        if !self.ended {
            if let Err(err) = self.workspace.end_operation(self.build, self.monitor) {
                warn!(error = %err, "Failed to end operation during unwind");
            }
        }
    }
}

impl Workspace {
    /// Open an operation guarded by `rule`.
    ///
    /// Blocks while another thread holds a conflicting rule or is
    /// broadcasting. A nested call must request a rule contained in the
    /// one its thread already holds.
    pub fn begin_operation(&self, rule: SchedulingRule) -> Result<(), ResourceError> {
        let depth = self.operations.enter()?;
        if let Err(err) = self.rules.acquire(rule) {
            self.leave(false, &crate::monitor::NullMonitor)?;
            return Err(err);
        }
        trace!(depth, "Operation started");
        Ok(())
    }

    /// Close the innermost operation of this thread.
    ///
    /// Closing the last operation in the workspace triggers the build
    /// hook (if `build` or auto-build) and change notification.
    pub fn end_operation(&self, build: bool, monitor: &dyn ProgressMonitor) -> Result<(), ResourceError> {
        if self.operations.depth() == 0 {
            return Err(ResourceError::NotInOperation(ResourcePath::root()));
        }
        self.rules.release();
        self.leave(build, monitor)
    }

    fn leave(&self, build: bool, monitor: &dyn ProgressMonitor) -> Result<(), ResourceError> {
        if self.operations.exit(build)? == Exit::Broadcast {
            let build = self.operations.take_build_request();
            self.broadcast(build, monitor);
            self.operations.finish_broadcast();
        }
        Ok(())
    }

    /// Run `action` inside an operation. Every change it makes is
    /// reported in one notification when the outermost operation ends.
    pub fn run<T, F>(
        &self,
        rule: SchedulingRule,
        build: bool,
        monitor: &dyn ProgressMonitor,
        action: F,
    ) -> Result<T, ResourceError>
    where
        F: FnOnce(&Workspace) -> Result<T, ResourceError>,
    {
        self.begin_operation(rule)?;
        let guard = OperationGuard {
            workspace: self,
            build,
            monitor,
            ended: false,
        };
        let result = action(self);
        let ended = guard.end();
        let value = result?;
        ended?;
        Ok(value)
    }

    /// Whether the current thread is inside an operation.
    pub fn is_in_operation(&self) -> bool {
        self.operations.depth() > 0
    }

    fn diff_context(&self) -> DiffContext<'_> {
        DiffContext {
            default_charset: &self.config.workspace.default_charset,
        }
    }

    /// Delta between the notification baseline and the current tree.
    pub(crate) fn delta_since_baseline(&self) -> Option<ResourceDelta> {
        let baseline = self.baseline.lock().root();
        let tree = self.tree.read();
        compute_delta(&tree, baseline, tree.current(), &self.diff_context())
    }

    fn broadcast(&self, build_requested: bool, monitor: &dyn ProgressMonitor) {
        let span = info_span!("broadcast", build = build_requested);
        let _enter = span.enter();
        let start = Instant::now();

        let auto = self.config.workspace.auto_build;
        let mut delta = self.delta_since_baseline();
        if let Some(pre) = delta.take() {
            if build_requested || auto {
                let kind = if build_requested {
                    BuildKind::Incremental
                } else {
                    BuildKind::Auto
                };
                self.run_build(pre, kind, monitor);
                delta = self.delta_since_baseline();
            } else {
                delta = Some(pre);
            }
        }

        if let Some(delta) = &delta {
            let _lock = self.operations.lock_tree(EventPhase::PostChange);
            self.dispatch_delta(EventPhase::PostChange, delta);
        }
        self.advance_baseline();

        debug!(
            changed = delta.is_some(),
            nodes = delta.as_ref().map_or(0, |d| d.node_count()),
            duration_ms = start.elapsed().as_millis() as u64,
            "Broadcast complete"
        );
    }

    fn run_build(&self, pre: ResourceDelta, kind: BuildKind, monitor: &dyn ProgressMonitor) {
        self.dispatch_delta(EventPhase::PreBuild, &pre);

        let checkpoint = self.tree.write().snapshot();
        let participant = self.build_participant.read().clone();
        if let Some(participant) = participant {
            debug!(kind = kind.as_str(), "Running build participant");
            if let Err(err) = participant.build(self, kind, &pre, monitor) {
                warn!(error = %err, kind = kind.as_str(), "Build participant failed");
            }
        }
        let inner = {
            let tree = self.tree.read();
            compute_delta(&tree, checkpoint.root(), tree.current(), &self.diff_context())
        };
        self.tree.write().release(checkpoint);

        let post = match inner {
            Some(inner) => merge(&pre, &inner),
            None => Some(pre),
        };
        if let Some(post) = &post {
            self.dispatch_delta(EventPhase::PostBuild, post);
            if kind == BuildKind::Auto {
                self.dispatch_delta(EventPhase::PostAutoBuild, post);
            }
        }
    }

    fn dispatch_delta(&self, phase: EventPhase, delta: &ResourceDelta) {
        if !self.listeners.has_listeners(phase) {
            return;
        }
        trace!(phase = phase.as_str(), nodes = delta.node_count(), "Notifying listeners");
        self.listeners.dispatch(&ResourceChangeEvent {
            phase,
            delta: Some(delta),
            resource: None,
            workspace: self,
        });
    }

    /// Fire a pre-close or pre-delete event. The tree is locked while
    /// listeners run.
    pub(crate) fn fire_resource_event(&self, phase: EventPhase, resource: &Resource) {
        if !self.listeners.has_listeners(phase) {
            return;
        }
        let _lock = self.operations.lock_tree(phase);
        self.listeners.dispatch(&ResourceChangeEvent {
            phase,
            delta: None,
            resource: Some(resource),
            workspace: self,
        });
    }

    fn advance_baseline(&self) {
        let mut tree = self.tree.write();
        let next = tree.snapshot();
        let previous = std::mem::replace(&mut *self.baseline.lock(), next);
        let reclaimed = tree.release(previous);
        trace!(reclaimed, live = tree.node_count(), "Advanced notification baseline");
    }
}
