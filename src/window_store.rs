// =============================================================================
// Window Store — per-account sliding aggregation window
// =============================================================================
//
// Tracks, for each target account, the transactions received in the trailing
// `window_seconds` interval. Used by the L1 engine to compute the rolling
// aggregates (`total_received`, `transaction_count`, `unique_senders`) that
// feed rules R1/R2/R3.
//
// Malformed timestamps on an inbound event are treated as "now" rather than
// rejected outright, matching the upstream game server's tolerance for clock
// skew on the producing side.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// A single received transaction retained for windowed aggregation.
#[derive(Debug, Clone)]
struct WindowEntry {
    sender_id: String,
    amount: i64,
    at: DateTime<Utc>,
}

/// Snapshot of a user's rolling window, used to populate `UserProfile`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowSnapshot {
    pub total_received: i64,
    pub transaction_count: u32,
    pub unique_senders: u32,
}

/// Rolling window of received transactions for a single account.
#[derive(Debug, Default)]
struct UserWindow {
    entries: Vec<WindowEntry>,
}

impl UserWindow {
    /// Drop entries older than `cutoff`. A malformed timestamp cannot be
    /// compared against `cutoff`, so such entries are parsed eagerly at
    /// insert time (see `WindowStore::add_and_snapshot`) and never reach
    /// this stage unparsed.
    fn purge(&mut self, cutoff: DateTime<Utc>) {
        self.entries.retain(|e| e.at >= cutoff);
    }

    fn snapshot(&self) -> WindowSnapshot {
        let total_received: i64 = self.entries.iter().map(|e| e.amount).sum();
        let transaction_count = self.entries.len() as u32;
        let mut senders: Vec<&str> = self.entries.iter().map(|e| e.sender_id.as_str()).collect();
        senders.sort_unstable();
        senders.dedup();
        WindowSnapshot {
            total_received,
            transaction_count,
            unique_senders: senders.len() as u32,
        }
    }
}

/// Keyed store of per-account rolling windows.
pub struct WindowStore {
    window_seconds: u64,
    windows: RwLock<HashMap<String, UserWindow>>,
}

impl WindowStore {
    pub fn new(window_seconds: u64) -> Self {
        Self {
            window_seconds,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Parse an event timestamp, falling back to the current time if it is
    /// malformed or absent.
    fn parse_timestamp(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    /// Record a transaction against `target_id`'s window, purge stale
    /// entries, and return the refreshed snapshot.
    pub fn add_and_snapshot(
        &self,
        target_id: &str,
        sender_id: &str,
        amount: i64,
        timestamp: &str,
    ) -> WindowSnapshot {
        let at = Self::parse_timestamp(timestamp);
        let cutoff = Utc::now() - chrono::Duration::seconds(self.window_seconds as i64);

        let mut windows = self.windows.write();
        let window = windows.entry(target_id.to_string()).or_default();
        window.entries.push(WindowEntry {
            sender_id: sender_id.to_string(),
            amount,
            at,
        });
        window.purge(cutoff);
        window.snapshot()
    }

    /// Read the current snapshot for `target_id` without mutating it, after
    /// purging stale entries.
    pub fn snapshot(&self, target_id: &str) -> WindowSnapshot {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.window_seconds as i64);
        let mut windows = self.windows.write();
        match windows.get_mut(target_id) {
            Some(window) => {
                window.purge(cutoff);
                window.snapshot()
            }
            None => WindowSnapshot::default(),
        }
    }

    /// Clear the window for `target_id`, e.g. after a ban makes further
    /// aggregation moot.
    pub fn reset(&self, target_id: &str) {
        self.windows.write().remove(target_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_within_window() {
        let store = WindowStore::new(300);
        let now = Utc::now().to_rfc3339();
        store.add_and_snapshot("victim", "a", 100, &now);
        let snap = store.add_and_snapshot("victim", "b", 200, &now);
        assert_eq!(snap.total_received, 300);
        assert_eq!(snap.transaction_count, 2);
        assert_eq!(snap.unique_senders, 2);
    }

    #[test]
    fn repeated_sender_counts_transactions_not_unique_senders() {
        let store = WindowStore::new(300);
        let now = Utc::now().to_rfc3339();
        store.add_and_snapshot("victim", "a", 100, &now);
        let snap = store.add_and_snapshot("victim", "a", 100, &now);
        assert_eq!(snap.transaction_count, 2);
        assert_eq!(snap.unique_senders, 1);
    }

    #[test]
    fn purges_entries_outside_window() {
        let store = WindowStore::new(1);
        let stale = (Utc::now() - chrono::Duration::seconds(10)).to_rfc3339();
        store.add_and_snapshot("victim", "a", 100, &stale);
        let snap = store.snapshot("victim");
        assert_eq!(snap.transaction_count, 0);
        assert_eq!(snap.total_received, 0);
    }

    #[test]
    fn malformed_timestamp_falls_back_to_now_instead_of_being_dropped() {
        let store = WindowStore::new(300);
        let snap = store.add_and_snapshot("victim", "a", 500, "not-a-timestamp");
        assert_eq!(snap.transaction_count, 1);
        assert_eq!(snap.total_received, 500);
    }

    #[test]
    fn reset_clears_window() {
        let store = WindowStore::new(300);
        let now = Utc::now().to_rfc3339();
        store.add_and_snapshot("victim", "a", 100, &now);
        store.reset("victim");
        let snap = store.snapshot("victim");
        assert_eq!(snap.transaction_count, 0);
    }
}
