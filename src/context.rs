// Cancellation and deadline propagation for a single search

use std::time::Duration;

use thiserror::Error;
use tokio::{
    sync::watch,
    time::{sleep_until, Instant},
};

// Fallback horizon when `now + duration` overflows
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

// `now + after`, saturating to a far-future instant instead of panicking
pub(crate) fn instant_after(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after).unwrap_or(now + FAR_FUTURE)
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

// Derived contexts share the cancel signal and can only tighten the deadline
#[derive(Debug, Clone)]
pub struct SearchContext {
    deadline: Option<Instant>,
    cancelled: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl SearchContext {
    // Never cancelled, no deadline
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            deadline: None,
            cancelled: rx,
        }
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancelled: rx,
            },
            CancelHandle { tx },
        )
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(instant_after(timeout))
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };

        Self {
            deadline: Some(deadline),
            cancelled: self.cancelled.clone(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    pub fn err(&self) -> Option<ContextError> {
        if self.is_cancelled() {
            return Some(ContextError::Cancelled);
        }

        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub async fn done(&self) -> ContextError {
        let mut rx = self.cancelled.clone();
        let cancelled = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // sender gone without cancelling: this context can only expire
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = cancelled => ContextError::Cancelled,
                _ = sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                cancelled.await;
                ContextError::Cancelled
            }
        }
    }
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::background()
    }
}
