//! One-shot rendezvous with deadline.
//!
//! A [`WaitGate`] bridges an asynchronous backend outcome to a synchronous
//! waiter: the interactive loop installs a gate, issues a request, and
//! blocks on [`wait`](WaitGate::wait); the event pump releases it with
//! [`signal`](WaitGate::signal) when the outcome arrives. A gate is used
//! for exactly one operation and never reused.
//!
//! If the wait times out, the gate latches a timed-out flag. An outcome
//! arriving afterward can consult [`timed_out`](WaitGate::timed_out) to
//! detect that it is stale and suppress its normal effects, performing only
//! cleanup (a late login success still triggers a corrective logout; a late
//! join success still leaves the channel it created).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// The single expected signal, as a stored `Notify` permit, plus the
/// latched timeout flag.
#[derive(Debug, Default)]
struct Inner {
    notify: Notify,
    timed_out: AtomicBool,
}

/// One-shot blocking synchronization point with timeout.
#[derive(Debug, Clone, Default)]
pub struct WaitGate {
    inner: Arc<Inner>,
}

impl WaitGate {
    /// Create a fresh, unsignalled gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the gate is signalled or `timeout` elapses.
    ///
    /// Returns true if the signal arrived in time. On timeout the gate's
    /// timed-out flag is latched before returning. `Notify` stores the
    /// permit, so a signal that raced ahead of the wait still completes it
    /// immediately.
    pub async fn wait(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.inner.notify.notified()).await {
            Ok(()) => true,
            Err(_) => {
                self.inner.timed_out.store(true, Ordering::SeqCst);
                false
            }
        }
    }

    /// Release the waiter. Called once per gate, from the event pump.
    pub fn signal(&self) {
        self.inner.notify.notify_one();
    }

    /// Whether a wait on this gate has already given up.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.inner.timed_out.load(Ordering::SeqCst)
    }
}
