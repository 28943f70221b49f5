// =============================================================================
// Persistence — best-effort SQLite snapshot store
// =============================================================================
//
// Periodically mirrors in-memory state to a SQLite file so an operator can
// inspect account history after a restart. Every write is best-effort: a
// failure is returned to the caller (who logs and discards it), never
// propagated into the event-processing pipeline.
//
// Opens a fresh connection per call rather than pooling, matching the
// low-throughput, audit-oriented access pattern this store serves.
// =============================================================================

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::l1_engine::L1Engine;
use crate::l2_engine::L2Engine;
use crate::state_machine::StateMachine;

pub struct PersistenceStore {
    db_path: String,
}

impl PersistenceStore {
    pub fn new(db_path: impl Into<String>) -> Result<Self> {
        let store = Self {
            db_path: db_path.into(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("failed to open persistence db at {}", self.db_path))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                current_state TEXT NOT NULL,
                total_received_5min INTEGER NOT NULL,
                transaction_count_5min INTEGER NOT NULL,
                unique_senders_5min INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS events (
                event_id TEXT PRIMARY KEY,
                actor_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                currency_amount INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS transitions (
                user_id TEXT NOT NULL,
                from_state TEXT NOT NULL,
                to_state TEXT NOT NULL,
                trigger TEXT NOT NULL,
                evidence_summary TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS analyses (
                target_id TEXT NOT NULL,
                risk_score INTEGER NOT NULL,
                fraud_type TEXT NOT NULL,
                recommended_action TEXT NOT NULL,
                reasoning TEXT NOT NULL
            );",
        )
        .context("failed to initialise persistence schema")?;
        Ok(())
    }

    /// Upsert every known user, and append-only insert any events,
    /// transitions, and analyses not already recorded. Called after every
    /// L2 completion; failures are surfaced to the caller to log, never to
    /// the event pipeline.
    pub fn persist_snapshot(
        &self,
        state_machine: &StateMachine,
        l1: &L1Engine,
        l2: &L2Engine,
    ) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction().context("failed to open persistence transaction")?;

        for user in state_machine.get_all_users() {
            tx.execute(
                "INSERT INTO users (user_id, current_state, total_received_5min, transaction_count_5min, unique_senders_5min)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    current_state = excluded.current_state,
                    total_received_5min = excluded.total_received_5min,
                    transaction_count_5min = excluded.transaction_count_5min,
                    unique_senders_5min = excluded.unique_senders_5min",
                rusqlite::params![
                    user.user_id,
                    user.current_state.to_string(),
                    user.total_received_5min,
                    user.transaction_count_5min,
                    user.unique_senders_5min,
                ],
            )
            .context("failed to upsert user")?;
        }

        for event in l1.get_recent_events(500) {
            tx.execute(
                "INSERT OR IGNORE INTO events (event_id, actor_id, target_id, currency_amount, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    event.event_id,
                    event.actor_id,
                    event.target_id,
                    event.action_details.currency_amount,
                    event.timestamp,
                ],
            )
            .context("failed to insert event")?;
        }

        for transition in state_machine.get_transitions(500) {
            tx.execute(
                "INSERT INTO transitions (user_id, from_state, to_state, trigger, evidence_summary, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    transition.user_id,
                    transition.from_state.to_string(),
                    transition.to_state.to_string(),
                    transition.trigger,
                    transition.evidence_summary,
                    transition.timestamp,
                ],
            )
            .context("failed to insert transition")?;
        }

        for analysis in l2.get_analyses(500) {
            tx.execute(
                "INSERT INTO analyses (target_id, risk_score, fraud_type, recommended_action, reasoning)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    analysis.target_id,
                    analysis.risk_score,
                    analysis.fraud_type.to_string(),
                    analysis.recommended_action.to_string(),
                    analysis.reasoning,
                ],
            )
            .context("failed to insert analysis")?;
        }

        tx.commit().context("failed to commit persistence transaction")?;
        Ok(())
    }

    /// Remove all persisted rows. Used by integration tests and the demo
    /// reset flow.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch("DELETE FROM users; DELETE FROM events; DELETE FROM transitions; DELETE FROM analyses;")
            .context("failed to clear persistence tables")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::l1_engine::L1Engine;
    use crate::l2_engine::L2Engine;
    use crate::models::AccountState;

    fn temp_store() -> PersistenceStore {
        let path = std::env::temp_dir().join(format!(
            "fraud_persist_test_{:?}_{:?}.db",
            std::thread::current().id(),
            std::time::Instant::now()
        ));
        PersistenceStore::new(path.to_string_lossy().to_string()).unwrap()
    }

    #[test]
    fn persists_user_and_allows_clear() {
        let store = temp_store();
        let sm = StateMachine::new();
        sm.get_or_create("u1");
        sm.transition("u1", AccountState::RestrictedWithdrawal, "L1_SCREENING", "R1", "evidence");
        let l1 = L1Engine::new(300, 1_000_000, 10, 100, 200);
        let l2 = L2Engine::new(None, None, None, 10, 5, 200);

        store.persist_snapshot(&sm, &l1, &l2).unwrap();

        let conn = store.open().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        store.clear_all().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
