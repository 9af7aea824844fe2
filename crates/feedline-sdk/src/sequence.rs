//! Ordering of overlapping fetches.
//!
//! Every fetch takes a ticket before it starts. When it completes, only the
//! holder of the most recently issued ticket may apply its result; anything
//! older has been overtaken and is dropped.

use std::sync::atomic::{AtomicU64, Ordering};

/// Issues monotonically increasing fetch tickets.
#[derive(Debug, Default)]
pub struct FetchSequencer {
    latest: AtomicU64,
}

/// Proof that a fetch was started at a given point in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.0
    }
}

impl FetchSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new fetch, superseding every earlier ticket.
    pub fn issue(&self) -> FetchTicket {
        FetchTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// True if no fetch has started since `ticket` was issued.
    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tickets_increase() {
        let seq = FetchSequencer::new();
        let a = seq.issue();
        let b = seq.issue();
        assert!(b > a);
        assert_eq!(seq.latest(), b.seq());
    }

    #[test]
    fn test_only_latest_is_current() {
        let seq = FetchSequencer::new();
        let first = seq.issue();
        assert!(seq.is_current(first));

        let second = seq.issue();
        assert!(!seq.is_current(first));
        assert!(seq.is_current(second));
    }
}
