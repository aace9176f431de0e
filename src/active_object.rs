//! Active objects: an HSM extended with a priority and a FIFO mailbox.
//!
//! An active object's mailbox is drained only by the scheduler in
//! [`crate::framework`], never concurrently: there is exactly one `RefCell`
//! borrow active at a time because everything runs on the single
//! event-loop thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::event::Event;
use crate::framework::Framework;
use crate::hsm::{self, StateMachine};

pub type Priority = u16;

/// A FIFO queue of events. `post_fifo` appends to the tail; `post_lifo`
/// inserts at the head, so it is the next event popped regardless of what
/// else is queued.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: VecDeque<Event>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn post_fifo(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    pub fn post_lifo(&mut self, event: Event) {
        self.queue.push_front(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    pub fn has_msgs(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// The fields every active object needs beyond its own domain state: its
/// scheduling priority, mailbox, a diagnostic name, and a handle back to the
/// framework it is registered with (state handlers use this to post events,
/// publish, and arm timers).
pub struct AoCore {
    name: String,
    pub(crate) priority: Priority,
    mailbox: Mailbox,
    pub framework: Rc<Framework>,
    self_handle: Option<Weak<dyn Dispatchable>>,
}

impl AoCore {
    pub fn new(name: impl Into<String>, framework: Rc<Framework>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            mailbox: Mailbox::new(),
            framework,
            self_handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// This active object's own handle, for state handlers that need to post
    /// to themselves or hand themselves to a [`crate::timer::TimeEvent`] as
    /// its target. Only set once [`start`] has finished wiring the object up;
    /// unavailable (and not needed) from inside `init`.
    pub fn self_handle(&self) -> AoHandle {
        self.self_handle
            .as_ref()
            .expect("self_handle read before start() finished wiring it up")
            .upgrade()
            .expect("active object dropped while still dispatching")
    }
}

/// Couples a [`StateMachine`] to an [`AoCore`]. Application active objects
/// implement this (and `StateMachine`) on a concrete struct that embeds an
/// `AoCore` field.
pub trait ActiveObject: StateMachine {
    fn core(&self) -> &AoCore;
    fn core_mut(&mut self) -> &mut AoCore;
}

/// Type-erased scheduler-facing view of an active object, so the framework
/// can hold a heterogeneous registry without every active object type
/// sharing a common concrete type.
pub trait Dispatchable {
    fn priority(&self) -> Priority;
    fn name(&self) -> &str;
    fn has_msgs(&self) -> bool;
    fn pop_msg(&self) -> Option<Event>;
    fn post_fifo(&self, event: Event);
    fn post_lifo(&self, event: Event);
    fn dispatch_one(&self, event: Event);
    fn run_init(&self, event: Option<Event>);
}

/// Shared-ownership, interior-mutable cell around a concrete active object,
/// coerced to `Rc<dyn Dispatchable>` wherever the framework needs to treat it
/// generically.
pub struct AoCell<T> {
    name: String,
    inner: RefCell<T>,
}

impl<T: ActiveObject> AoCell<T> {
    pub fn new(ao: T) -> Rc<Self> {
        let name = ao.core().name().to_string();
        Rc::new(Self {
            name,
            inner: RefCell::new(ao),
        })
    }

    /// Borrows the concrete active object directly, for callers that hold a
    /// typed `Rc<AoCell<T>>` rather than the erased handle.
    pub fn borrow(&self) -> std::cell::Ref<'_, T> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> std::cell::RefMut<'_, T> {
        self.inner.borrow_mut()
    }
}

impl<T: ActiveObject + 'static> Dispatchable for AoCell<T> {
    fn priority(&self) -> Priority {
        self.inner.borrow().core().priority()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn has_msgs(&self) -> bool {
        self.inner.borrow().core().mailbox.has_msgs()
    }

    fn pop_msg(&self) -> Option<Event> {
        self.inner.borrow_mut().core_mut().mailbox.pop()
    }

    fn post_fifo(&self, event: Event) {
        self.inner.borrow_mut().core_mut().mailbox.post_fifo(event);
    }

    fn post_lifo(&self, event: Event) {
        self.inner.borrow_mut().core_mut().mailbox.post_lifo(event);
    }

    fn dispatch_one(&self, event: Event) {
        hsm::dispatch(&mut *self.inner.borrow_mut(), &event);
    }

    fn run_init(&self, event: Option<Event>) {
        hsm::init(&mut *self.inner.borrow_mut(), event.as_ref());
    }
}

/// Shared handle to a type-erased active object, as stored in the
/// framework's registry, priority index, and subscriber table.
pub type AoHandle = Rc<dyn Dispatchable>;

/// Assigns `priority`, registers with `framework` (asserting priority
/// uniqueness), wires up the active object's own handle so its state
/// handlers can post to or arm timers against themselves, runs `init`, and
/// requests an RTC cycle.
pub fn start<T: ActiveObject + 'static>(
    framework: &Rc<Framework>,
    mut ao: T,
    priority: Priority,
    init_event: Option<Event>,
) -> Rc<AoCell<T>> {
    ao.core_mut().priority = priority;
    let cell = AoCell::new(ao);
    let handle: AoHandle = cell.clone();
    cell.borrow_mut().core_mut().self_handle = Some(Rc::downgrade(&handle));
    framework.register(cell.clone());
    cell.run_init(init_event);
    framework.rtc();
    cell
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_fifo_preserves_insertion_order() {
        let mut mb = Mailbox::new();
        mb.post_fifo(Event::new(1, None));
        mb.post_fifo(Event::new(2, None));
        assert_eq!(mb.pop().unwrap().signal, 1);
        assert_eq!(mb.pop().unwrap().signal, 2);
        assert!(mb.pop().is_none());
    }

    #[test]
    fn post_lifo_is_popped_next() {
        let mut mb = Mailbox::new();
        mb.post_fifo(Event::new(1, None));
        mb.post_lifo(Event::new(2, None));
        assert_eq!(mb.pop().unwrap().signal, 2);
        assert_eq!(mb.pop().unwrap().signal, 1);
    }
}
