//! The framework: registry of active objects, the publish/subscribe table,
//! the run-to-completion scheduler, the time-event service, and lifecycle
//! (`run_forever`/`stop`).
//!
//! There is exactly one `Framework` per process (or per test), held behind an
//! `Rc` and shared by every active object it owns. It keeps a `Weak` copy of
//! itself (`self_weak`, built via `Rc::new_cyclic`) so that any `&self`
//! method can hand out a fresh `Rc<Framework>` to move into a deferred
//! closure, without forcing every public method to take `self: Rc<Self>`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::active_object::{AoHandle, Priority};
use crate::adapter::EventLoopAdapter;
use crate::error::FrameworkError;
use crate::event::Event;
use crate::signal::{SIG_SIGTERM, SignalId, SignalRegistry};
use crate::timer::{Shared as TimerShared, TimerData, TimerEntry, fire_event};

pub struct Framework {
    self_weak: Weak<Framework>,
    signals: Rc<RefCell<SignalRegistry>>,
    ao_registry: RefCell<Vec<AoHandle>>,
    priority_index: RefCell<HashMap<Priority, AoHandle>>,
    subscriber_table: RefCell<IndexMap<SignalId, Vec<AoHandle>>>,
    timers: RefCell<TimerData>,
    adapter: Rc<dyn EventLoopAdapter>,
}

impl Framework {
    pub fn new(adapter: Rc<dyn EventLoopAdapter>) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            self_weak: weak.clone(),
            signals: Rc::new(RefCell::new(SignalRegistry::new())),
            ao_registry: RefCell::new(Vec::new()),
            priority_index: RefCell::new(HashMap::new()),
            subscriber_table: RefCell::new(IndexMap::new()),
            timers: RefCell::new(TimerData::default()),
            adapter,
        })
    }

    fn handle(&self) -> Rc<Framework> {
        self.self_weak
            .upgrade()
            .expect("framework dropped while a reference to it was still live")
    }

    pub fn signals(&self) -> Rc<RefCell<SignalRegistry>> {
        self.signals.clone()
    }

    pub fn now(&self) -> Instant {
        self.adapter.now()
    }

    /// Non-panicking probe for callers that want to check before registering
    /// rather than rely on [`Framework::register`]'s assertion.
    pub fn has_priority(&self, priority: Priority) -> bool {
        self.priority_index.borrow().contains_key(&priority)
    }

    /// Registers `ao`, returning [`FrameworkError::DuplicatePriority`] instead
    /// of panicking if its priority is already taken.
    pub fn try_register(&self, ao: AoHandle) -> Result<(), FrameworkError> {
        let priority = ao.priority();
        let mut index = self.priority_index.borrow_mut();
        if index.contains_key(&priority) {
            return Err(FrameworkError::DuplicatePriority(priority));
        }
        index.insert(priority, ao.clone());
        drop(index);
        debug!(ao = ao.name(), priority, "active object registered");
        self.ao_registry.borrow_mut().push(ao);
        Ok(())
    }

    /// Registers `ao`, asserting priority uniqueness (the contract-violation
    /// path per §7; use [`Framework::try_register`] to recover instead).
    pub fn register(&self, ao: AoHandle) {
        let priority = ao.priority();
        self.try_register(ao)
            .unwrap_or_else(|_| panic!("active-object priority {priority} is already registered"));
    }

    /// Registers `ao` under `name`'s signal (registering the signal if it
    /// does not exist yet), in subscription order.
    pub fn subscribe(&self, name: &str, ao: AoHandle) {
        let signal = self.signals.borrow_mut().register(name);
        trace!(ao = ao.name(), signal, name, "subscribed");
        self.subscriber_table
            .borrow_mut()
            .entry(signal)
            .or_default()
            .push(ao);
    }

    /// Appends `event` to every subscriber of its signal, in subscription
    /// order, then requests an RTC cycle.
    pub fn publish(&self, event: Event) {
        if let Some(subscribers) = self.subscriber_table.borrow().get(&event.signal) {
            trace!(signal = event.signal, n = subscribers.len(), "publish");
            for ao in subscribers {
                ao.post_fifo(event.clone());
            }
        }
        self.rtc();
    }

    /// Posts `event` directly to `ao`'s mailbox and requests an RTC cycle.
    pub fn post(&self, event: Event, ao: &AoHandle) {
        ao.post_fifo(event);
        self.rtc();
    }

    /// Defers a `run` invocation onto the event loop so it executes after
    /// the current task yields.
    pub fn rtc(&self) {
        let fw = self.handle();
        self.adapter.defer_soon(Box::new(move || fw.run()));
    }

    /// The RTC loop: repeatedly sort the registry by ascending priority,
    /// dispatch one event from the highest-priority non-empty mailbox, and
    /// restart the scan. Terminates when every mailbox is empty.
    pub fn run(&self) {
        loop {
            let mut registry: Vec<AoHandle> = self.ao_registry.borrow().clone();
            registry.sort_by_key(|ao| ao.priority());
            let mut dispatched = false;
            for ao in &registry {
                if ao.has_msgs() {
                    if let Some(event) = ao.pop_msg() {
                        trace!(ao = ao.name(), signal = event.signal, "dispatch");
                        ao.dispatch_one(event);
                        dispatched = true;
                    }
                    break;
                }
            }
            if !dispatched {
                break;
            }
        }
    }

    /// Enters the event loop; on exit, invokes `stop()`.
    pub async fn run_forever(&self) {
        self.adapter.run_forever().await;
        self.stop();
    }

    /// Cancels any pending timer callback, posts `SIGTERM` to every
    /// registered AO, runs them to completion so EXIT handlers fire, then
    /// stops the event loop.
    pub fn stop(&self) {
        self.cancel_pending_timer();
        let registry: Vec<AoHandle> = self.ao_registry.borrow().clone();
        debug!(n = registry.len(), "stopping: posting SIGTERM to all AOs");
        for ao in &registry {
            ao.post_fifo(Event::sigterm());
        }
        self.run();
        self.adapter.stop();
        self.adapter.close();
    }

    fn cancel_pending_timer(&self) {
        if let Some(handle) = self.timers.borrow_mut().pending.take() {
            handle.cancel();
        }
    }

    // --- time events -----------------------------------------------------

    pub(crate) fn insert_time_event(&self, shared: Rc<RefCell<TimerShared>>, deadline: Instant) {
        let now = self.now();
        if deadline <= now {
            let (signal, target, interval) = {
                let s = shared.borrow();
                (s.signal, s.target.clone(), s.interval)
            };
            trace!(signal, "time event deadline already past; firing immediately");
            target.post_fifo(fire_event(signal));
            if let Some(interval) = interval {
                self.insert_time_event(shared, deadline + interval);
            }
            self.rtc();
            return;
        }

        let mut data = self.timers.borrow_mut();
        let seq = data.next_seq;
        data.next_seq += 1;
        shared.borrow_mut().armed = true;
        let pos = data
            .entries
            .partition_point(|e| (e.deadline, e.seq) <= (deadline, seq));
        data.entries.insert(pos, TimerEntry { seq, deadline, shared });
        let is_head = pos == 0;
        drop(data);
        if is_head {
            self.reschedule_head();
        }
    }

    fn reschedule_head(&self) {
        let mut data = self.timers.borrow_mut();
        if let Some(old) = data.pending.take() {
            old.cancel();
        }
        let next = data.entries.first().map(|e| (e.deadline, e.seq));
        drop(data);
        if let Some((deadline, seq)) = next {
            let fw = self.handle();
            let handle = self
                .adapter
                .schedule_at(deadline, Box::new(move || fw.fire_time_event(seq)));
            self.timers.borrow_mut().pending = Some(handle);
        }
    }

    fn fire_time_event(&self, seq: u64) {
        let mut data = self.timers.borrow_mut();
        if data.entries.first().map(|e| e.seq) != Some(seq) {
            // Stale callback: the head changed since this was scheduled.
            return;
        }
        let entry = data.entries.remove(0);
        data.pending = None;
        drop(data);

        let (signal, target, interval) = {
            let mut s = entry.shared.borrow_mut();
            s.armed = false;
            (s.signal, s.target.clone(), s.interval)
        };
        trace!(signal, "time event fired");
        target.post_fifo(fire_event(signal));
        if let Some(interval) = interval {
            self.insert_time_event(entry.shared, entry.deadline + interval);
        }
        self.reschedule_head();
        self.rtc();
    }

    pub(crate) fn remove_time_event(&self, shared: &Rc<RefCell<TimerShared>>) {
        let mut data = self.timers.borrow_mut();
        if let Some(idx) = data.entries.iter().position(|e| Rc::ptr_eq(&e.shared, shared)) {
            let was_head = idx == 0;
            data.entries.remove(idx);
            shared.borrow_mut().armed = false;
            drop(data);
            if was_head {
                self.reschedule_head();
            }
        }
    }
}
