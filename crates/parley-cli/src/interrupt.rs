//! Ctrl+C routing.
//!
//! Tokio keeps its SIGINT handler installed once `ctrl_c()` has been awaited,
//! so a single long-lived task owns the signal: it cancels the reply being
//! streamed, or exits the process when none is.

use parley_core::CancelHandle;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Exit status of a process ended by SIGINT.
const INTERRUPTED_EXIT: i32 = 130;

static ACTIVE_REPLY: ReplySlot = ReplySlot::new();

/// Holds the cancel handle of the reply in flight, if any.
pub struct ReplySlot {
    active: Mutex<Option<CancelHandle>>,
}

impl ReplySlot {
    pub const fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    /// A fresh handle that Ctrl+C cancels until [`ReplySlot::end`].
    pub fn begin(&self) -> CancelHandle {
        let handle = CancelHandle::new();
        *self.lock() = Some(handle.clone());
        handle
    }

    pub fn end(&self) {
        self.lock().take();
    }

    /// Cancel the reply in flight. Returns `false` when there is none.
    pub fn interrupt(&self) -> bool {
        match self.lock().as_ref() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<CancelHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawn the task that owns SIGINT for the rest of the process.
pub fn install() {
    tokio::spawn(async {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !ACTIVE_REPLY.interrupt() {
                eprintln!();
                std::process::exit(INTERRUPTED_EXIT);
            }
        }
        tracing::debug!("Ctrl+C handler unavailable");
    });
}

/// Start a reply that Ctrl+C may cancel.
pub fn begin_reply() -> CancelHandle {
    ACTIVE_REPLY.begin()
}

pub fn end_reply() {
    ACTIVE_REPLY.end();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_cancels_only_the_active_reply() {
        let slot = ReplySlot::new();
        assert!(!slot.interrupt());

        let handle = slot.begin();
        assert!(slot.interrupt());
        assert!(handle.is_cancelled());

        slot.end();
        assert!(!slot.interrupt());
    }

    #[test]
    fn each_reply_gets_a_fresh_handle() {
        let slot = ReplySlot::new();
        let first = slot.begin();
        slot.interrupt();
        slot.end();

        let second = slot.begin();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }
}
