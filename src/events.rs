//! Resource change events and listener registration.

use crate::delta::ResourceDelta;
use crate::resource::Resource;
use crate::workspace::Workspace;
use bitflags::bitflags;
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

bitflags! {
    /// Phases a listener subscribes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const PRE_CLOSE = 1 << 0;
        const PRE_DELETE = 1 << 1;
        const PRE_BUILD = 1 << 2;
        const POST_BUILD = 1 << 3;
        const POST_AUTO_BUILD = 1 << 4;
        const POST_CHANGE = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventPhase {
    PreClose,
    PreDelete,
    PreBuild,
    PostBuild,
    PostAutoBuild,
    PostChange,
}

impl EventPhase {
    pub fn mask(self) -> EventMask {
        match self {
            EventPhase::PreClose => EventMask::PRE_CLOSE,
            EventPhase::PreDelete => EventMask::PRE_DELETE,
            EventPhase::PreBuild => EventMask::PRE_BUILD,
            EventPhase::PostBuild => EventMask::POST_BUILD,
            EventPhase::PostAutoBuild => EventMask::POST_AUTO_BUILD,
            EventPhase::PostChange => EventMask::POST_CHANGE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventPhase::PreClose => "PRE_CLOSE",
            EventPhase::PreDelete => "PRE_DELETE",
            EventPhase::PreBuild => "PRE_BUILD",
            EventPhase::PostBuild => "POST_BUILD",
            EventPhase::PostAutoBuild => "POST_AUTO_BUILD",
            EventPhase::PostChange => "POST_CHANGE",
        }
    }
}

/// Event handed to listeners.
///
/// Pre-close and pre-delete events carry the project and no delta; the
/// other phases carry a delta rooted at the workspace root.
pub struct ResourceChangeEvent<'a> {
    pub phase: EventPhase,
    pub delta: Option<&'a ResourceDelta>,
    pub resource: Option<&'a Resource>,
    pub workspace: &'a Workspace,
}

pub trait ResourceChangeListener: Send + Sync {
    fn resource_changed(&self, event: &ResourceChangeEvent<'_>);
}

impl<F> ResourceChangeListener for F
where
    F: Fn(&ResourceChangeEvent<'_>) + Send + Sync,
{
    fn resource_changed(&self, event: &ResourceChangeEvent<'_>) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    mask: EventMask,
    listener: Arc<dyn ResourceChangeListener>,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: RwLock<Vec<Registration>>,
    next: AtomicU64,
}

impl ListenerRegistry {
    pub fn add(&self, listener: Arc<dyn ResourceChangeListener>, mask: EventMask) -> ListenerId {
        let id = ListenerId(self.next.fetch_add(1, Ordering::SeqCst));
        self.entries.write().push(Registration { id, mask, listener });
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|r| r.id != id);
        entries.len() != before
    }

    pub fn has_listeners(&self, phase: EventPhase) -> bool {
        self.entries.read().iter().any(|r| r.mask.contains(phase.mask()))
    }

    /// Deliver an event to every listener subscribed to its phase. A
    /// panicking listener is logged and does not stop delivery.
    pub fn dispatch(&self, event: &ResourceChangeEvent<'_>) {
        let targets: Vec<Arc<dyn ResourceChangeListener>> = self
            .entries
            .read()
            .iter()
            .filter(|r| r.mask.contains(event.phase.mask()))
            .map(|r| Arc::clone(&r.listener))
            .collect();
        for listener in targets {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.resource_changed(event)));
            if outcome.is_err() {
                error!(phase = event.phase.as_str(), "Resource change listener panicked");
            }
        }
    }
}

/// Owned copy of an event, for consumers on other threads.
#[derive(Debug, Clone)]
pub struct OwnedEvent {
    pub phase: EventPhase,
    pub delta: Option<ResourceDelta>,
    pub resource: Option<Resource>,
}

/// Listener that forwards owned events into a channel.
pub struct ChannelListener {
    sender: Mutex<Sender<OwnedEvent>>,
}

impl ChannelListener {
    pub fn new_pair() -> (Self, Receiver<OwnedEvent>) {
        let (sender, receiver) = channel();
        (
            Self {
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }
}

impl ResourceChangeListener for ChannelListener {
    fn resource_changed(&self, event: &ResourceChangeEvent<'_>) {
        let owned = OwnedEvent {
            phase: event.phase,
            delta: event.delta.cloned(),
            resource: event.resource.cloned(),
        };
        if self.sender.lock().send(owned).is_err() {
            warn!(phase = event.phase.as_str(), "Event receiver dropped");
        }
    }
}

/// Receive events until one satisfies `predicate` or `timeout` elapses.
pub fn wait_for<F>(receiver: &Receiver<OwnedEvent>, timeout: Duration, mut predicate: F) -> Option<OwnedEvent>
where
    F: FnMut(&OwnedEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok(event) if predicate(&event) => return Some(event),
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}
