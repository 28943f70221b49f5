// =============================================================================
// State Machine — per-account fraud status DAG
// =============================================================================
//
// Accounts move through a fixed directed acyclic graph:
//
//   NORMAL <──────────────┐
//     │  L1_SCREENING     │  L2_VERDICT (low risk)
//     ▼                   │
//   RESTRICTED_WITHDRAWAL ─┤
//     │  L2_VERDICT        │
//     ▼                    │
//   UNDER_SURVEILLANCE ────┘
//     │  L2_VERDICT
//     ▼
//   BANNED                   (terminal — no outgoing edges)
//
// `transition` refuses any edge not present in `ALLOWED_TRANSITIONS` by
// returning `false`; it never errors, matching the "state refusals are not
// failures" error-handling policy.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::info;

use crate::models::{AccountState, ArbitrationResult, TransitionLog, UserProfile};

/// Returns the set of states reachable from `from` in a single hop.
fn allowed_targets(from: AccountState) -> &'static [AccountState] {
    use AccountState::*;
    match from {
        Normal => &[RestrictedWithdrawal],
        RestrictedWithdrawal => &[Normal, UnderSurveillance, Banned],
        UnderSurveillance => &[Normal, Banned],
        Banned => &[],
    }
}

fn is_allowed(from: AccountState, to: AccountState) -> bool {
    allowed_targets(from).contains(&to)
}

/// Per-account record tracked by the state machine.
#[derive(Debug, Clone)]
struct AccountRecord {
    state: AccountState,
    total_received_5min: i64,
    transaction_count_5min: u32,
    unique_senders_5min: u32,
    blocked_withdrawals: u32,
}

impl Default for AccountRecord {
    fn default() -> Self {
        Self {
            state: AccountState::Normal,
            total_received_5min: 0,
            transaction_count_5min: 0,
            unique_senders_5min: 0,
            blocked_withdrawals: 0,
        }
    }
}

/// Authoritative store of account state and the transition audit log.
pub struct StateMachine {
    accounts: RwLock<HashMap<String, AccountRecord>>,
    transitions: RwLock<Vec<TransitionLog>>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            transitions: RwLock::new(Vec::new()),
        }
    }

    /// Return the current state of `user_id`, creating a `NORMAL` record if
    /// this is the first time it has been seen.
    pub fn get_or_create(&self, user_id: &str) -> AccountState {
        let mut accounts = self.accounts.write();
        accounts.entry(user_id.to_string()).or_default().state
    }

    /// Attempt a transition. Returns `true` if the edge is legal and was
    /// applied, `false` if the edge is not in `ALLOWED_TRANSITIONS` (a
    /// refusal, not an error).
    pub fn transition(
        &self,
        user_id: &str,
        to: AccountState,
        trigger: &str,
        triggered_by_rule: &str,
        evidence_summary: impl Into<String>,
    ) -> bool {
        let mut accounts = self.accounts.write();
        let record = accounts.entry(user_id.to_string()).or_default();
        let from = record.state;

        if from == to {
            return false;
        }
        if !is_allowed(from, to) {
            return false;
        }

        record.state = to;
        drop(accounts);

        let log = TransitionLog {
            user_id: user_id.to_string(),
            from_state: from,
            to_state: to,
            trigger: trigger.to_string(),
            triggered_by_rule: triggered_by_rule.to_string(),
            timestamp: format!("{}Z", chrono::Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.f")),
            evidence_summary: evidence_summary.into(),
        };

        info!(
            user_id = %user_id,
            from = %from,
            to = %to,
            trigger = %trigger,
            "account transitioned"
        );

        let mut transitions = self.transitions.write();
        transitions.push(log);

        true
    }

    /// Apply an L2 arbitration verdict to `user_id`'s state, using the
    /// tabular mapping from recommended action to transition. A recommended
    /// action of `RESTRICTED_WITHDRAWAL` is a deliberate no-op: L2 never
    /// demotes an account back into the intermediate restricted state on its
    /// own authority.
    pub fn apply_l2_verdict(&self, user_id: &str, verdict: &ArbitrationResult) -> bool {
        let risk_score = verdict.risk_score;
        match verdict.recommended_action {
            AccountState::Banned => self.transition(
                user_id,
                AccountState::Banned,
                "L2_VERDICT",
                "L2_ARBITRATION",
                format!("RMT confirmed (risk_score: {risk_score})"),
            ),
            AccountState::UnderSurveillance => self.transition(
                user_id,
                AccountState::UnderSurveillance,
                "L2_VERDICT",
                "L2_ARBITRATION",
                format!("Requires surveillance (risk_score: {risk_score})"),
            ),
            AccountState::Normal => self.transition(
                user_id,
                AccountState::Normal,
                "L2_VERDICT",
                "L2_ARBITRATION",
                format!("Low-risk auto recovery (risk_score: {risk_score})"),
            ),
            AccountState::RestrictedWithdrawal => {
                info!(
                    user_id = %user_id,
                    risk_score,
                    "L2 intermediate transition (risk_score: {risk_score}) — no-op by design"
                );
                false
            }
        }
    }

    /// Whether `user_id` is currently permitted to withdraw.
    pub fn can_withdraw(&self, user_id: &str) -> bool {
        let accounts = self.accounts.read();
        match accounts.get(user_id) {
            Some(record) => matches!(record.state, AccountState::Normal | AccountState::UnderSurveillance),
            None => true,
        }
    }

    /// Record a blocked withdrawal attempt for stats purposes.
    pub fn increment_blocked_withdrawals(&self, user_id: &str) {
        let mut accounts = self.accounts.write();
        accounts.entry(user_id.to_string()).or_default().blocked_withdrawals += 1;
    }

    /// Update the cached rolling-window aggregates shown in read
    /// projections.
    pub fn update_window_aggregates(
        &self,
        user_id: &str,
        total_received_5min: i64,
        transaction_count_5min: u32,
        unique_senders_5min: u32,
    ) {
        let mut accounts = self.accounts.write();
        let record = accounts.entry(user_id.to_string()).or_default();
        record.total_received_5min = total_received_5min;
        record.transaction_count_5min = transaction_count_5min;
        record.unique_senders_5min = unique_senders_5min;
    }

    pub fn user_profile(&self, user_id: &str) -> UserProfile {
        let accounts = self.accounts.read();
        match accounts.get(user_id) {
            Some(record) => UserProfile {
                user_id: user_id.to_string(),
                current_state: record.state,
                total_received_5min: record.total_received_5min,
                transaction_count_5min: record.transaction_count_5min,
                unique_senders_5min: record.unique_senders_5min,
            },
            None => UserProfile::new(user_id),
        }
    }

    pub fn get_transitions(&self, limit: usize) -> Vec<TransitionLog> {
        let transitions = self.transitions.read();
        transitions.iter().rev().take(limit).cloned().collect()
    }

    pub fn get_all_users(&self) -> Vec<UserProfile> {
        let accounts = self.accounts.read();
        accounts
            .iter()
            .map(|(user_id, record)| UserProfile {
                user_id: user_id.clone(),
                current_state: record.state,
                total_received_5min: record.total_received_5min,
                transaction_count_5min: record.transaction_count_5min,
                unique_senders_5min: record.unique_senders_5min,
            })
            .collect()
    }

    /// Aggregate counts of accounts in each state plus total blocked
    /// withdrawals, for the `/api/v1/stats` endpoint.
    pub fn get_stats(&self) -> StateMachineStats {
        let accounts = self.accounts.read();
        let mut stats = StateMachineStats::default();
        for record in accounts.values() {
            match record.state {
                AccountState::Normal => stats.normal += 1,
                AccountState::RestrictedWithdrawal => stats.restricted_withdrawal += 1,
                AccountState::UnderSurveillance => stats.under_surveillance += 1,
                AccountState::Banned => stats.banned += 1,
            }
            stats.blocked_withdrawals += record.blocked_withdrawals;
        }
        stats.total_accounts = accounts.len();
        stats
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StateMachineStats {
    pub total_accounts: usize,
    pub normal: u32,
    pub restricted_withdrawal: u32,
    pub under_surveillance: u32,
    pub banned: u32,
    pub blocked_withdrawals: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FraudType;

    fn verdict(action: AccountState, risk_score: i32) -> ArbitrationResult {
        ArbitrationResult {
            target_id: "u1".into(),
            is_fraud: action != AccountState::Normal,
            risk_score,
            fraud_type: FraudType::RmtDirect,
            recommended_action: action,
            reasoning: "test".into(),
            evidence_event_ids: vec![],
            confidence: 0.8,
        }
    }

    #[test]
    fn new_account_starts_normal() {
        let sm = StateMachine::new();
        assert_eq!(sm.get_or_create("u1"), AccountState::Normal);
    }

    #[test]
    fn legal_transition_succeeds() {
        let sm = StateMachine::new();
        sm.get_or_create("u1");
        assert!(sm.transition("u1", AccountState::RestrictedWithdrawal, "L1_SCREENING", "R1_VOLUME", ""));
        assert_eq!(sm.user_profile("u1").current_state, AccountState::RestrictedWithdrawal);
    }

    #[test]
    fn illegal_transition_is_refused_not_an_error() {
        let sm = StateMachine::new();
        sm.get_or_create("u1");
        assert!(!sm.transition("u1", AccountState::Banned, "L1_SCREENING", "R1_VOLUME", ""));
        assert_eq!(sm.user_profile("u1").current_state, AccountState::Normal);
    }

    #[test]
    fn banned_is_terminal() {
        let sm = StateMachine::new();
        sm.get_or_create("u1");
        sm.transition("u1", AccountState::RestrictedWithdrawal, "L1_SCREENING", "R1", "");
        sm.transition("u1", AccountState::Banned, "L2_VERDICT", "L2_ARBITRATION", "");
        assert!(!sm.transition("u1", AccountState::Normal, "L2_VERDICT", "L2_ARBITRATION", ""));
        assert_eq!(sm.user_profile("u1").current_state, AccountState::Banned);
    }

    #[test]
    fn apply_l2_verdict_banned_writes_confirmed_evidence() {
        let sm = StateMachine::new();
        sm.get_or_create("u1");
        sm.transition("u1", AccountState::RestrictedWithdrawal, "L1_SCREENING", "R1", "");
        assert!(sm.apply_l2_verdict("u1", &verdict(AccountState::Banned, 90)));
        let last = sm.get_transitions(1).into_iter().next().unwrap();
        assert_eq!(last.evidence_summary, "RMT confirmed (risk_score: 90)");
    }

    #[test]
    fn apply_l2_verdict_restricted_withdrawal_is_a_noop() {
        let sm = StateMachine::new();
        sm.get_or_create("u1");
        sm.transition("u1", AccountState::RestrictedWithdrawal, "L1_SCREENING", "R1", "");
        assert!(!sm.apply_l2_verdict("u1", &verdict(AccountState::RestrictedWithdrawal, 50)));
        assert_eq!(sm.user_profile("u1").current_state, AccountState::RestrictedWithdrawal);
    }

    #[test]
    fn can_withdraw_false_when_restricted() {
        let sm = StateMachine::new();
        sm.get_or_create("u1");
        sm.transition("u1", AccountState::RestrictedWithdrawal, "L1_SCREENING", "R1", "");
        assert!(!sm.can_withdraw("u1"));
    }

    #[test]
    fn can_withdraw_true_under_surveillance() {
        let sm = StateMachine::new();
        sm.get_or_create("u1");
        sm.transition("u1", AccountState::RestrictedWithdrawal, "L1_SCREENING", "R1", "");
        sm.transition("u1", AccountState::UnderSurveillance, "L2_VERDICT", "L2_ARBITRATION", "");
        assert!(sm.can_withdraw("u1"));
    }
}
