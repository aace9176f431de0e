//! Events: an immutable `(signal_id, value)` pair.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::signal::{SIG_EMPTY, SIG_ENTRY, SIG_EXIT, SIG_INIT, SIG_SIGTERM, SignalId};

/// An opaque event payload. Application code downcasts via [`Event::value`].
pub type Value = Rc<dyn Any>;

/// An immutable `(signal, payload)` pair dispatched to a state handler.
///
/// Cloning an `Event` is cheap: the payload is reference-counted, not
/// duplicated.
#[derive(Clone)]
pub struct Event {
    pub signal: SignalId,
    value: Option<Value>,
}

impl Event {
    pub fn new(signal: SignalId, value: Option<Value>) -> Self {
        Self { signal, value }
    }

    /// Builds an event carrying a typed payload, erasing it into `Rc<dyn Any>`.
    pub fn with_value<T: 'static>(signal: SignalId, value: T) -> Self {
        Self::new(signal, Some(Rc::new(value)))
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Downcasts the payload to `T`, if present and of that type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.as_ref().and_then(|v| v.downcast_ref::<T>())
    }

    pub const fn empty() -> Self {
        Self {
            signal: SIG_EMPTY,
            value: None,
        }
    }

    pub const fn entry() -> Self {
        Self {
            signal: SIG_ENTRY,
            value: None,
        }
    }

    pub const fn exit() -> Self {
        Self {
            signal: SIG_EXIT,
            value: None,
        }
    }

    pub const fn init() -> Self {
        Self {
            signal: SIG_INIT,
            value: None,
        }
    }

    pub const fn sigterm() -> Self {
        Self {
            signal: SIG_SIGTERM,
            value: None,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("signal", &self.signal)
            .field("has_value", &self.value.is_some())
            .finish()
    }
}
