//! Per-request cancellation and deadline handle.
//!
//! # Responsibility
//! - Carry a caller-supplied deadline and cancellation flag into every store
//!   and index call.
//!
//! # Invariants
//! - Once a context reports done it stays done.
//! - Clones share the same cancellation flag.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation and deadline signal propagated from the triggering request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

/// Returned when a context fired before or during an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded;

impl Display for DeadlineExceeded {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "request deadline exceeded")
    }
}

impl Error for DeadlineExceeded {}

impl RequestContext {
    /// Context that never expires unless cancelled explicitly.
    pub fn background() -> Self {
        Self::default()
    }

    /// Context expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fires the context for this handle and all of its clones.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when no deadline is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns whether the context was cancelled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fails fast when the context is already done.
    pub fn check(&self) -> Result<(), DeadlineExceeded> {
        if self.is_done() {
            return Err(DeadlineExceeded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DeadlineExceeded, RequestContext};
    use std::time::{Duration, Instant};

    #[test]
    fn background_context_is_never_done() {
        let ctx = RequestContext::background();
        assert!(!ctx.is_done());
        assert!(ctx.remaining().is_none());
        assert_eq!(ctx.check(), Ok(()));
    }

    #[test]
    fn elapsed_deadline_reports_done() {
        let ctx = RequestContext::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(ctx.is_done());
        assert_eq!(ctx.check(), Err(DeadlineExceeded));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(60));
        let clone = ctx.clone();
        assert!(!clone.is_done());

        ctx.cancel();
        assert!(clone.is_done());
    }
}
