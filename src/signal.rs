//! Signal registry: maps signal names to dense, append-only integer IDs.
//!
//! The registry is append-only and idempotent: registering an already-known
//! name returns its prior ID rather than allocating a new one. IDs are
//! assigned contiguously starting at zero, so the five system signals
//! registered by [`SignalRegistry::new`] always land on 0..=4.

use std::collections::HashMap;

use crate::error::FrameworkError;

pub type SignalId = u32;

pub const SIG_EMPTY: SignalId = 0;
pub const SIG_ENTRY: SignalId = 1;
pub const SIG_EXIT: SignalId = 2;
pub const SIG_INIT: SignalId = 3;
pub const SIG_SIGTERM: SignalId = 4;

pub const EMPTY: &str = "EMPTY";
pub const ENTRY: &str = "ENTRY";
pub const EXIT: &str = "EXIT";
pub const INIT: &str = "INIT";
pub const SIGTERM: &str = "SIGTERM";

/// Process-wide (per-`Framework`) mapping between signal names and IDs.
///
/// Monotonic: names are never removed and IDs are never reused, satisfying
/// the "signal IDs are contiguous and never reused" invariant.
#[derive(Debug, Default)]
pub struct SignalRegistry {
    by_name: HashMap<String, SignalId>,
    by_id: Vec<String>,
}

impl SignalRegistry {
    /// Builds a registry with the five reserved signals pre-registered, in
    /// the order `EMPTY, ENTRY, EXIT, INIT, SIGTERM`.
    pub fn new() -> Self {
        let mut registry = Self {
            by_name: HashMap::new(),
            by_id: Vec::new(),
        };
        for name in [EMPTY, ENTRY, EXIT, INIT, SIGTERM] {
            registry.register(name);
        }
        registry
    }

    /// Registers `name`, returning its ID. Idempotent: a name already in the
    /// registry returns its existing ID unchanged.
    pub fn register(&mut self, name: &str) -> SignalId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.by_id.len() as SignalId;
        self.by_name.insert(name.to_string(), id);
        self.by_id.push(name.to_string());
        id
    }

    pub fn exists(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Non-panicking lookup for callers that want to handle an unknown name
    /// themselves.
    pub fn get(&self, name: &str) -> Option<SignalId> {
        self.by_name.get(name).copied()
    }

    /// Same as [`SignalRegistry::get`] but returns a `FrameworkError` instead
    /// of `None`, for call sites that propagate via `?`.
    pub fn try_id(&self, name: &str) -> Result<SignalId, FrameworkError> {
        self.get(name)
            .ok_or_else(|| FrameworkError::UnknownSignal(name.to_string()))
    }

    /// Attribute-style lookup: `signal name -> id`, panicking if the name was
    /// never registered. Per the error-handling contract, an unknown name
    /// here is a programming error, not a recoverable condition.
    pub fn id(&self, name: &str) -> SignalId {
        *self
            .by_name
            .get(name)
            .unwrap_or_else(|| panic!("unknown signal name: {name}"))
    }

    pub fn name(&self, id: SignalId) -> Option<&str> {
        self.by_id.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_signals_have_fixed_ids() {
        let reg = SignalRegistry::new();
        assert_eq!(reg.id(EMPTY), SIG_EMPTY);
        assert_eq!(reg.id(ENTRY), SIG_ENTRY);
        assert_eq!(reg.id(EXIT), SIG_EXIT);
        assert_eq!(reg.id(INIT), SIG_INIT);
        assert_eq!(reg.id(SIGTERM), SIG_SIGTERM);
    }

    #[test]
    fn register_is_idempotent() {
        let mut reg = SignalRegistry::new();
        let a = reg.register("NET_RXD");
        let b = reg.register("NET_RXD");
        assert_eq!(a, b);
        assert_eq!(reg.len(), 6);
    }

    #[test]
    fn ids_are_contiguous_and_append_only() {
        let mut reg = SignalRegistry::new();
        let first = reg.register("TICK");
        let second = reg.register("TOCK");
        assert_eq!(first, 5);
        assert_eq!(second, 6);
        assert_eq!(reg.name(first), Some("TICK"));
    }

    #[test]
    fn unknown_name_lookup_is_fallible_via_get() {
        let reg = SignalRegistry::new();
        assert_eq!(reg.get("NOPE"), None);
        assert!(reg.try_id("NOPE").is_err());
    }

    #[test]
    #[should_panic(expected = "unknown signal name")]
    fn attribute_style_lookup_panics_on_unknown_name() {
        let reg = SignalRegistry::new();
        reg.id("NOPE");
    }
}
