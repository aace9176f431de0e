//! Time events: a reusable event descriptor bound to a signal, posted
//! to its target active object at an absolute deadline or on a periodic
//! cadence. Bookkeeping (the sorted deadline list, the single outstanding
//! callback) lives on [`crate::framework::Framework`]; this module is the
//! public handle and the data the framework's registry stores per entry.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::Instant;

use crate::active_object::AoHandle;
use crate::event::Event;
use crate::framework::Framework;
use crate::signal::SignalId;

/// State shared between a [`TimeEvent`] handle and the framework's internal
/// sorted list, so `disarm()` can find and remove the right entry and the
/// firing callback can tell whether it is still armed.
pub(crate) struct Shared {
    pub(crate) signal: SignalId,
    pub(crate) target: AoHandle,
    pub(crate) interval: Option<Duration>,
    pub(crate) armed: bool,
}

/// One entry in the framework's sorted deadline list.
pub(crate) struct TimerEntry {
    pub(crate) seq: u64,
    pub(crate) deadline: Instant,
    pub(crate) shared: Rc<RefCell<Shared>>,
}

/// The framework's timer bookkeeping: the sorted list and the handle to the
/// one outstanding scheduled callback.
#[derive(Default)]
pub(crate) struct TimerData {
    pub(crate) entries: Vec<TimerEntry>,
    pub(crate) pending: Option<crate::adapter::TimerHandle>,
    pub(crate) next_seq: u64,
}

/// A reusable, signal-bound timer. Registers its signal with the framework
/// on construction.
pub struct TimeEvent {
    framework: Rc<Framework>,
    shared: Rc<RefCell<Shared>>,
}

impl TimeEvent {
    pub fn new(framework: &Rc<Framework>, signal_name: &str, target: AoHandle) -> Self {
        let signal = framework.signals().borrow_mut().register(signal_name);
        let shared = Rc::new(RefCell::new(Shared {
            signal,
            target,
            interval: None,
            armed: false,
        }));
        Self {
            framework: framework.clone(),
            shared,
        }
    }

    /// One-shot: fires at the given absolute deadline.
    pub fn post_at(&self, deadline: Instant) {
        self.shared.borrow_mut().interval = None;
        self.framework.insert_time_event(self.shared.clone(), deadline);
    }

    /// One-shot: fires `delta` from now.
    pub fn post_in(&self, delta: Duration) {
        let deadline = self.framework.now() + delta;
        self.post_at(deadline);
    }

    /// Periodic: fires every `delta`, starting `delta` from now.
    pub fn post_every(&self, delta: Duration) {
        self.shared.borrow_mut().interval = Some(delta);
        let deadline = self.framework.now() + delta;
        self.framework.insert_time_event(self.shared.clone(), deadline);
    }

    /// Removes this event from the active list, cancelling its callback if
    /// it currently owns the outstanding one.
    pub fn disarm(&self) {
        self.framework.remove_time_event(&self.shared);
    }

    pub fn is_armed(&self) -> bool {
        self.shared.borrow().armed
    }
}

pub(crate) fn fire_event(signal: SignalId) -> Event {
    Event::new(signal, None)
}
