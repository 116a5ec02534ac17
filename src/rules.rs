//! Scheduling rules
//!
//! An operation declares the part of the namespace it may modify. Two
//! top-level operations whose rules overlap are serialized; a nested
//! operation must stay inside the rule its thread already holds.

use crate::error::ResourceError;
use crate::tree::path::ResourcePath;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::thread::{self, ThreadId};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingRule {
    /// The whole workspace.
    Workspace,
    /// A resource and everything below it.
    Resource(ResourcePath),
    /// Union of several resource subtrees.
    Multiple(Vec<ResourcePath>),
}

impl SchedulingRule {
    pub fn for_path(path: &ResourcePath) -> Self {
        if path.is_root() {
            SchedulingRule::Workspace
        } else {
            SchedulingRule::Resource(path.clone())
        }
    }

    fn paths(&self) -> Vec<ResourcePath> {
        match self {
            SchedulingRule::Workspace => vec![ResourcePath::root()],
            SchedulingRule::Resource(path) => vec![path.clone()],
            SchedulingRule::Multiple(paths) => paths.clone(),
        }
    }

    /// True if every resource `other` covers is covered by `self`.
    pub fn contains(&self, other: &SchedulingRule) -> bool {
        let mine = self.paths();
        other
            .paths()
            .iter()
            .all(|theirs| mine.iter().any(|p| p.is_prefix_of(theirs)))
    }

    pub fn conflicts(&self, other: &SchedulingRule) -> bool {
        let mine = self.paths();
        other
            .paths()
            .iter()
            .any(|theirs| mine.iter().any(|p| p.is_prefix_of(theirs) || theirs.is_prefix_of(p)))
    }
}

impl fmt::Display for SchedulingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingRule::Workspace => f.write_str("workspace"),
            SchedulingRule::Resource(path) => write!(f, "{}", path),
            SchedulingRule::Multiple(paths) => {
                let parts: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Tracks the rules held by each thread.
#[derive(Debug, Default)]
pub struct RuleManager {
    held: Mutex<HashMap<ThreadId, Vec<SchedulingRule>>>,
    released: Condvar,
}

impl RuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `rule` for the current thread, blocking while another
    /// thread holds a conflicting rule.
    pub fn acquire(&self, rule: SchedulingRule) -> Result<(), ResourceError> {
        let me = thread::current().id();
        let mut held = self.held.lock();
        if let Some(stack) = held.get_mut(&me) {
            if let Some(outer) = stack.first() {
                if !outer.contains(&rule) {
                    return Err(ResourceError::RuleConflict {
                        held: outer.to_string(),
                        requested: rule.to_string(),
                    });
                }
            }
            stack.push(rule);
            return Ok(());
        }
        loop {
            let blocked = held
                .iter()
                .any(|(owner, stack)| *owner != me && stack.first().map_or(false, |r| r.conflicts(&rule)));
            if !blocked {
                break;
            }
            trace!(rule = %rule, "Waiting for conflicting rule");
            self.released.wait(&mut held);
        }
        held.insert(me, vec![rule]);
        Ok(())
    }

    /// Release the innermost rule held by the current thread.
    pub fn release(&self) {
        let me = thread::current().id();
        let mut held = self.held.lock();
        let emptied = match held.get_mut(&me) {
            Some(stack) => {
                stack.pop();
                stack.is_empty()
            }
            None => false,
        };
        if emptied {
            held.remove(&me);
            self.released.notify_all();
        }
    }

    pub fn holds_rule(&self) -> bool {
        self.held.lock().contains_key(&thread::current().id())
    }
}
