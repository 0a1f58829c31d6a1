//! Cooperative cancellation signal for `Scheduler::run`.
//!
//! The teacher repo passes plain `bool`/`AtomicBool` stop flags through its
//! crawler loop rather than a token type; this follows that idiom (atomic +
//! `Notify`) instead of pulling in `tokio-util` for one type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct CancelSignal(Arc<Inner>);

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub async fn cancelled(&self) {
        if self.0.cancelled.load(Ordering::SeqCst) {
            return;
        }
        self.0.notify.notified().await;
    }
}
