//! Error taxonomy for the lifecycle-level surface of the framework.
//!
//! The dispatch/init algorithm itself has no recoverable errors: a
//! duplicate priority, a misbehaving `ENTRY`/`EXIT` handler, or a hierarchy
//! deeper than [`crate::hsm::MAX_NEST_DEPTH`] are programming contract
//! violations and abort via `assert!`/`panic!` at the call site. This module
//! covers the handful of conditions above that hot path that a host
//! application can meaningfully recover from.

use thiserror::Error;

use crate::active_object::Priority;
use crate::logging::LoggingError;

#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("active-object priority {0} is already registered")]
    DuplicatePriority(Priority),

    #[error("unknown signal name: {0}")]
    UnknownSignal(String),

    #[error(transparent)]
    Logging(#[from] LoggingError),
}
