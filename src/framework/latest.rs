//! A monotonic generation counter: the newest request wins, older ones are told to drop their results.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tracing::{debug, warn};

use super::Outcome;

/// Hands out [`Ticket`]s in increasing order and remembers the newest one.
///
/// Work tagged with a ticket checks [`Ticket::check`] after it finishes. If another ticket was issued in the
/// meantime, the work is stale and its results must not be applied.
#[derive(Debug, Default, Clone)]
pub struct LatestOnly {
    latest: Arc<AtomicU64>,
}

/// Identifies one request issued through [`LatestOnly`].
#[derive(Debug, Clone)]
pub struct Ticket {
    /// The generation of this request. Can be compared against other tickets.
    pub index: u64,
    /// The name of the request, used by loggers to distinguish between requests.
    pub name: String,
    latest: Arc<AtomicU64>,
}

impl LatestOnly {
    /// Creates a [`LatestOnly`] with no tickets issued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new ticket, superseding every ticket issued before it.
    pub fn begin(&self, name: impl Into<String>) -> Ticket {
        let index = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let name = name.into();
        debug!("issued generation {index} for {name}");

        Ticket {
            index,
            name,
            latest: Arc::clone(&self.latest),
        }
    }

    /// Supersedes every ticket issued so far without starting new work.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }
}

impl Ticket {
    /// Checks if this ticket is still the newest one.
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.index
    }

    /// Runs `apply` with `value` if this ticket is still the newest, otherwise drops the value.
    pub fn check<T, R, F>(&self, value: T, apply: F) -> Outcome<R>
    where
        F: FnOnce(T) -> R,
    {
        if self.is_current() {
            Outcome::Current(apply(value))
        } else {
            warn!(
                "generation {} of {} is falling behind the latest one ({}), dropping its results",
                self.index,
                self.name,
                self.latest.load(Ordering::SeqCst)
            );
            Outcome::Stale
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_ticket_wins() {
        let latest = LatestOnly::new();
        let first = latest.begin("octocat/alpha");
        let second = latest.begin("octocat/beta");

        assert!(!first.is_current());
        assert!(second.is_current());
        assert_eq!(first.check(1, |n| n), Outcome::Stale);
        assert_eq!(second.check(2, |n| n + 1), Outcome::Current(3));
    }

    #[test]
    fn invalidate_supersedes_outstanding_tickets() {
        let latest = LatestOnly::new();
        let ticket = latest.begin("octocat/alpha");
        latest.invalidate();

        assert!(!ticket.is_current());
        assert!(latest.begin("octocat/beta").index > ticket.index + 1);
    }

    #[tokio::test]
    async fn tickets_survive_awaits() {
        let latest = LatestOnly::new();
        let ticket = latest.begin("octocat/alpha");

        let value = async { 42 }.await;

        assert_eq!(ticket.check(value, |n| n), Outcome::Current(42));
    }
}
