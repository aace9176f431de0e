//! The event-loop adapter: the framework's sole dependency on a host runtime.
//! Everything the framework needs from a cooperative event loop (monotonic
//! time, a "call soon", a one-shot deadline callback, and a way to block
//! until shutdown) is expressed here as a narrow, object-safe trait, so
//! [`crate::framework::Framework`] never depends on `tokio` directly.

use async_trait::async_trait;
use std::cell::Cell;
use std::rc::Rc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A callback deferred or scheduled through the adapter. Not `Send`: the
/// framework and its active objects are `Rc`-based and live entirely on one
/// thread.
pub type DeferredFn = Box<dyn FnOnce()>;

/// A handle to a pending [`EventLoopAdapter::schedule_at`] callback.
pub struct TimerHandle {
    join: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.join.abort();
    }
}

/// The narrow interface the framework needs from a cooperative event loop.
#[async_trait(?Send)]
pub trait EventLoopAdapter {
    /// Monotonic time, in the same units used for scheduling deadlines.
    fn now(&self) -> Instant;

    /// Arranges for `callback` to run at or after `deadline`. The returned
    /// handle's `cancel()` prevents that.
    fn schedule_at(&self, deadline: Instant, callback: DeferredFn) -> TimerHandle;

    /// Thread-safe "call soon": runs `callback` after the current task
    /// yields, never synchronously.
    fn defer_soon(&self, callback: DeferredFn);

    /// Blocks until [`EventLoopAdapter::stop`] is called.
    async fn run_forever(&self);

    /// Unblocks a pending [`EventLoopAdapter::run_forever`].
    fn stop(&self);

    /// Releases any resources the adapter holds. A no-op for adapters with
    /// nothing to release.
    fn close(&self) {}
}

/// The production adapter: a `tokio` `LocalSet` runtime. `schedule_at` and
/// `defer_soon` are implemented as `spawn_local` tasks since callbacks close
/// over `Rc`-based framework state.
pub struct TokioAdapter {
    notify: Rc<Notify>,
    stopped: Cell<bool>,
}

impl TokioAdapter {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            notify: Rc::new(Notify::new()),
            stopped: Cell::new(false),
        })
    }
}

#[async_trait(?Send)]
impl EventLoopAdapter for TokioAdapter {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_at(&self, deadline: Instant, callback: DeferredFn) -> TimerHandle {
        let join = tokio::task::spawn_local(async move {
            tokio::time::sleep_until(deadline).await;
            callback();
        });
        TimerHandle { join }
    }

    fn defer_soon(&self, callback: DeferredFn) {
        tokio::task::spawn_local(async move {
            tokio::task::yield_now().await;
            callback();
        });
    }

    async fn run_forever(&self) {
        if self.stopped.get() {
            return;
        }
        self.notify.notified().await;
    }

    fn stop(&self) {
        self.stopped.set(true);
        self.notify.notify_waiters();
    }
}
