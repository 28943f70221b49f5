// =============================================================================
// Event Coordinator — the per-event processing pipeline
// =============================================================================
//
// For every inbound `GameEventLog`:
//
//   1. Acquire the target account's lock (serialises all events for that
//      account).
//   2. Run L1 screening, which mutates the rolling window as a side effect.
//   3. Mirror the refreshed window snapshot (best-effort).
//   4. If the event was screened (any rule fired) and the account is
//      currently NORMAL, transition it to RESTRICTED_WITHDRAWAL.
//   5. Escalate to L2 if R4 fired, or if the event was screened against an
//      account already away from NORMAL (re-escalation); build the analysis
//      request while still holding the lock, then release the lock.
//   6. Dispatch L2 arbitration as a detached task (outside the lock) —
//      arbitration never blocks the ingesting caller or another event for a
//      different account.
//   7. On L2 completion, apply the verdict to the state machine, mirror the
//      transition, and best-effort persist a snapshot.
//
// Withdrawal requests are gated by `can_withdraw` and never touch the lock —
// they are a point read, not a mutation.
// =============================================================================

use std::sync::Arc;

use tracing::{error, info};

use crate::l1_engine::L1Engine;
use crate::l2_engine::L2Engine;
use crate::lock_manager::LockManager;
use crate::mirror::Mirror;
use crate::models::{AccountState, GameEventLog, ScreeningResult};
use crate::persistence::PersistenceStore;
use crate::state_machine::StateMachine;

pub struct EventCoordinator {
    pub l1: Arc<L1Engine>,
    pub l2: Arc<L2Engine>,
    pub state_machine: Arc<StateMachine>,
    pub locks: Arc<LockManager>,
    pub mirror: Arc<dyn Mirror>,
    pub persistence: Option<Arc<PersistenceStore>>,
}

impl EventCoordinator {
    pub fn new(
        l1: Arc<L1Engine>,
        l2: Arc<L2Engine>,
        state_machine: Arc<StateMachine>,
        locks: Arc<LockManager>,
        mirror: Arc<dyn Mirror>,
        persistence: Option<Arc<PersistenceStore>>,
    ) -> Self {
        Self {
            l1,
            l2,
            state_machine,
            locks,
            mirror,
            persistence,
        }
    }

    /// Process one event end-to-end, per the pipeline above. Returns the L1
    /// screening result for the caller (e.g. for the synchronous demo
    /// showcase endpoint, which waits on the spawned L2 task separately).
    pub async fn process_event(self: &Arc<Self>, event: GameEventLog) -> ScreeningResult {
        self.state_machine.get_or_create(&event.target_id);

        let guard = self.locks.acquire(&event.target_id).await;

        let screening = self.l1.screen(&event);
        let window = self.l1.window_snapshot(&event.target_id);
        self.state_machine.update_window_aggregates(
            &event.target_id,
            window.total_received,
            window.transaction_count,
            window.unique_senders,
        );
        self.mirror
            .mirror_window(&event.target_id, window.total_received, window.transaction_count)
            .await;

        let current_state = self.state_machine.get_or_create(&event.target_id);
        if screening.screened && current_state == AccountState::Normal {
            let evidence = format!("L1 rules triggered: {}", screening.triggered_rules.join(", "));
            if self.state_machine.transition(
                &event.target_id,
                AccountState::RestrictedWithdrawal,
                "L1_SCREENING",
                &screening.triggered_rules.join(","),
                evidence.clone(),
            ) {
                self.mirror
                    .mirror_transition(&event.target_id, "RESTRICTED_WITHDRAWAL", &evidence)
                    .await;
            }
        }

        let needs_l2 =
            screening.needs_l2 || (screening.screened && current_state != AccountState::Normal);

        let analysis_request = if needs_l2 {
            let user_profile = self.state_machine.user_profile(&event.target_id);
            Some(
                self.l1
                    .build_analysis_request(&event, screening.triggered_rules.clone(), user_profile),
            )
        } else {
            None
        };

        // Lock released here, before any L2 call.
        drop(guard);

        if let Some(request) = analysis_request {
            let coordinator = self.clone();
            tokio::spawn(async move {
                coordinator.run_l2_and_apply(request).await;
            });
        }

        screening
    }

    /// Run L2 arbitration for `request` and apply the verdict, outside any
    /// lock held by the ingesting caller. Any failure here is logged, never
    /// propagated.
    async fn run_l2_and_apply(self: Arc<Self>, request: crate::models::AnalysisRequest) {
        let target_id = request.trigger_event.target_id.clone();
        let verdict = self.l2.analyze(&request).await;

        let _guard = self.locks.acquire(&target_id).await;
        if self.state_machine.apply_l2_verdict(&target_id, &verdict) {
            let evidence = verdict.reasoning.clone();
            self.mirror
                .mirror_transition(&target_id, &verdict.recommended_action.to_string(), &evidence)
                .await;
        }
        drop(_guard);

        if let Some(store) = &self.persistence {
            if let Err(e) = store.persist_snapshot(&self.state_machine, &self.l1, &self.l2) {
                error!(error = %e, "persistence snapshot failed");
            }
        }

        info!(target_id = %target_id, risk_score = verdict.risk_score, "L2 arbitration complete");
    }

    /// Run L1 + L2 synchronously against a single event, bypassing the
    /// detached-task dispatch used by `process_event`. Used by the demo
    /// showcase endpoint, which needs the verdict before responding.
    pub async fn analyze_now(self: &Arc<Self>, event: GameEventLog) -> crate::models::ArbitrationResult {
        let guard = self.locks.acquire(&event.target_id).await;
        let screening = self.l1.screen(&event);
        let user_profile = self.state_machine.user_profile(&event.target_id);
        let request = self
            .l1
            .build_analysis_request(&event, screening.triggered_rules, user_profile);
        drop(guard);

        let verdict = self.l2.analyze(&request).await;

        let _guard = self.locks.acquire(&event.target_id).await;
        self.state_machine.apply_l2_verdict(&event.target_id, &verdict);
        verdict
    }

    /// Gate a withdrawal attempt. Returns `true` if the withdrawal is
    /// permitted; records a blocked-withdrawal stat otherwise.
    pub fn withdraw_gate(&self, user_id: &str) -> bool {
        let allowed = self.state_machine.can_withdraw(user_id);
        if !allowed {
            self.state_machine.increment_blocked_withdrawals(user_id);
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionDetails, ContextMetadata};
    use crate::mirror::NoopMirror;

    fn make_event(target_id: &str, amount: i64) -> GameEventLog {
        GameEventLog {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            event_type: "TRADE".to_string(),
            actor_id: "sender".to_string(),
            target_id: target_id.to_string(),
            action_details: ActionDetails {
                currency_amount: amount,
                item_id: None,
                market_avg_price: None,
            },
            context_metadata: ContextMetadata::default(),
        }
    }

    fn build_coordinator() -> Arc<EventCoordinator> {
        Arc::new(EventCoordinator::new(
            Arc::new(L1Engine::new(300, 1_000_000, 10, 100, 200)),
            Arc::new(L2Engine::new(None, None, None, 10, 5, 200)),
            Arc::new(StateMachine::new()),
            Arc::new(LockManager::new()),
            Arc::new(NoopMirror),
            None,
        ))
    }

    #[tokio::test]
    async fn benign_event_does_not_transition_account() {
        let coordinator = build_coordinator();
        coordinator.process_event(make_event("u1", 10)).await;
        assert_eq!(
            coordinator.state_machine.user_profile("u1").current_state,
            AccountState::Normal
        );
    }

    #[tokio::test]
    async fn rule_triggering_event_restricts_withdrawal() {
        let coordinator = build_coordinator();
        coordinator.process_event(make_event("u1", 2_000_000)).await;
        assert_eq!(
            coordinator.state_machine.user_profile("u1").current_state,
            AccountState::RestrictedWithdrawal
        );
        assert!(!coordinator.withdraw_gate("u1"));
    }

    #[tokio::test]
    async fn withdraw_gate_allows_normal_accounts() {
        let coordinator = build_coordinator();
        coordinator.state_machine.get_or_create("u1");
        assert!(coordinator.withdraw_gate("u1"));
    }

    #[tokio::test]
    async fn concurrent_events_for_same_target_converge_on_one_promotion() {
        let coordinator = build_coordinator();
        let mut handles = Vec::new();
        for i in 0..30 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.process_event(make_event("victim", 2_000_000 + i)).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        // Exactly one promotion out of NORMAL regardless of how many
        // concurrent triggering events arrived; later events on the
        // now-restricted account may legitimately re-escalate to L2, but
        // none of them can promote the account out of NORMAL a second time.
        assert_ne!(
            coordinator.state_machine.user_profile("victim").current_state,
            AccountState::Normal
        );
        let promotions_out_of_normal = coordinator
            .state_machine
            .get_transitions(1000)
            .into_iter()
            .filter(|t| t.from_state == AccountState::Normal)
            .count();
        assert_eq!(promotions_out_of_normal, 1);
    }

    #[tokio::test]
    async fn analyze_now_side_effects_the_window() {
        let coordinator = build_coordinator();
        coordinator.analyze_now(make_event("u1", 2_000_000)).await;
        let profile = coordinator.state_machine.user_profile("u1");
        assert_eq!(profile.total_received_5min, 0); // analyze_now doesn't call update_window_aggregates directly
        let snapshot = coordinator.l1.window_snapshot("u1");
        assert_eq!(snapshot.total_received, 2_000_000);
    }
}
