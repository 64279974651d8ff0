//! Issuance-ordered request tickets.
//!
//! Results of asynchronous fetches are applied only when they are newer (by
//! issuance) than the last result applied for the same key, so a slow stale
//! response can never overwrite fresher data.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    pub key: K,
    pub seq: u64,
}

#[derive(Debug, Clone)]
pub struct RequestSequencer<K> {
    next_seq: u64,
    /// Latest ticket issued per key that has not completed or been abandoned
    in_flight: HashMap<K, u64>,
    /// Latest ticket applied per key
    applied: HashMap<K, u64>,
}

impl<K> Default for RequestSequencer<K>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> RequestSequencer<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            in_flight: HashMap::new(),
            applied: HashMap::new(),
        }
    }

    pub fn issue(&mut self, key: K) -> Ticket<K> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.insert(key.clone(), seq);
        Ticket { key, seq }
    }

    /// Issue only when no request for `key` is outstanding.
    pub fn issue_if_idle(&mut self, key: K) -> Option<Ticket<K>> {
        if self.in_flight.contains_key(&key) {
            return None;
        }
        Some(self.issue(key))
    }

    /// Record a completion. Returns true when the result should be applied.
    pub fn complete(&mut self, ticket: &Ticket<K>) -> bool {
        self.release(ticket);
        let last_applied = self.applied.get(&ticket.key).copied().unwrap_or(0);
        if ticket.seq <= last_applied {
            tracing::debug!(
                "Discarding stale result (ticket {} <= applied {})",
                ticket.seq,
                last_applied
            );
            return false;
        }
        self.applied.insert(ticket.key.clone(), ticket.seq);
        true
    }

    /// Record a failed request without applying anything.
    pub fn abandon(&mut self, ticket: &Ticket<K>) {
        self.release(ticket);
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn release(&mut self, ticket: &Ticket<K>) {
        if self.in_flight.get(&ticket.key) == Some(&ticket.seq) {
            self.in_flight.remove(&ticket.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_completion_is_discarded() {
        let mut seq = RequestSequencer::new();
        let first = seq.issue("metar");
        let second = seq.issue("metar");
        assert!(seq.complete(&second));
        assert!(!seq.complete(&first));
        assert!(!seq.is_in_flight(&"metar"));
    }

    #[test]
    fn in_order_completions_apply() {
        let mut seq = RequestSequencer::new();
        let first = seq.issue("radar");
        let second = seq.issue("radar");
        assert!(seq.complete(&first));
        assert!(seq.is_in_flight(&"radar"));
        assert!(seq.complete(&second));
    }

    #[test]
    fn keys_are_independent() {
        let mut seq = RequestSequencer::new();
        let a = seq.issue("a");
        let b = seq.issue("b");
        assert!(seq.complete(&b));
        assert!(seq.complete(&a));
    }

    #[test]
    fn idle_issue_dedupes_until_released() {
        let mut seq = RequestSequencer::new();
        let ticket = seq.issue_if_idle("tile").unwrap();
        assert!(seq.issue_if_idle("tile").is_none());
        seq.abandon(&ticket);
        assert!(seq.issue_if_idle("tile").is_some());
        assert_eq!(seq.in_flight_count(), 1);
    }
}
