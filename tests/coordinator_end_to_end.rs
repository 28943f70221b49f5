// Integration tests driving the full event coordinator through its public
// API, matching the Python prototype's `tests/test_concurrency.py` and
// `test_e2e_*` battery: concurrency flood convergence, L2 verdict
// application, and the withdrawal gate reacting to state transitions.

use std::sync::Arc;

use fraud_screen_core::coordinator::EventCoordinator;
use fraud_screen_core::l1_engine::L1Engine;
use fraud_screen_core::l2_engine::L2Engine;
use fraud_screen_core::lock_manager::LockManager;
use fraud_screen_core::mirror::NoopMirror;
use fraud_screen_core::models::{AccountState, ActionDetails, ContextMetadata, GameEventLog};
use fraud_screen_core::state_machine::StateMachine;

fn event(target_id: &str, actor_id: &str, amount: i64, chat: Option<&str>) -> GameEventLog {
    GameEventLog {
        event_id: uuid::Uuid::new_v4().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        event_type: "TRADE".to_string(),
        actor_id: actor_id.to_string(),
        target_id: target_id.to_string(),
        action_details: ActionDetails {
            currency_amount: amount,
            item_id: None,
            market_avg_price: None,
        },
        context_metadata: ContextMetadata {
            actor_level: 1,
            account_age_days: 0,
            recent_chat_log: chat.map(|s| s.to_string()),
        },
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
async fn a_single_rule_trigger_restricts_withdrawal_end_to_end() {
    let coordinator = build_coordinator();
    coordinator
        .process_event(event("victim", "sender", 2_000_000, None))
        .await;

    assert_eq!(
        coordinator.state_machine.user_profile("victim").current_state,
        AccountState::RestrictedWithdrawal
    );
    assert!(!coordinator.withdraw_gate("victim"));
}

#[tokio::test]
async fn smurfing_scenario_escalates_through_l2_to_banned() {
    let coordinator = build_coordinator();

    // An account already under L1's restricted-withdrawal hold, as it would
    // be after an earlier triggering event.
    coordinator.state_machine.get_or_create("victim");
    assert!(coordinator.state_machine.transition(
        "victim",
        AccountState::RestrictedWithdrawal,
        "L1_SCREENING",
        "SETUP",
        "test setup",
    ));

    // Prime the rolling window past the frequency threshold with small
    // transfers from distinct mule accounts, directly against L1 so this
    // doesn't re-trigger the full coordinator pipeline.
    for i in 0..11 {
        let sender = format!("mule_{i:02}");
        coordinator.l1.screen(&event("victim", &sender, 10_000, None));
    }

    // The converging transfer trips every rule at once: volume, frequency
    // (window now past threshold), market anomaly, and chat-log slang —
    // enough for the local L2 fallback to clamp at the maximum risk score.
    let mut trigger = event("victim", "mule_10", 2_000_000, Some("銀行振込確認 D今確認 りょ。"));
    trigger.action_details.market_avg_price = Some(1_000);
    let verdict = coordinator.analyze_now(trigger).await;

    assert_eq!(verdict.risk_score, 100);
    assert_eq!(verdict.recommended_action, AccountState::Banned);
    assert_eq!(
        coordinator.state_machine.user_profile("victim").current_state,
        AccountState::Banned
    );
    assert!(!coordinator.withdraw_gate("victim"));
}

#[tokio::test]
async fn concurrent_flood_against_one_account_converges_on_single_promotion() {
    let coordinator = build_coordinator();

    let mut handles = Vec::new();
    for i in 0..40 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .process_event(event("victim", "sender", 2_000_000 + i, None))
                .await;
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    // Later events against the now-restricted account may legitimately
    // re-escalate to L2 (and that escalation runs as a detached background
    // task we don't wait on here), so only the synchronous invariant — at
    // most one promotion out of NORMAL — is asserted.
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
async fn distinct_accounts_do_not_interfere_under_concurrency() {
    let coordinator = build_coordinator();

    let mut handles = Vec::new();
    for user in ["alice", "bob", "carol"] {
        for i in 0..10 {
            let coordinator = coordinator.clone();
            let user = user.to_string();
            handles.push(tokio::spawn(async move {
                coordinator
                    .process_event(event(&user, "sender", 2_000_000 + i, None))
                    .await;
            }));
        }
    }
    for h in handles {
        h.await.unwrap();
    }

    for user in ["alice", "bob", "carol"] {
        assert_ne!(
            coordinator.state_machine.user_profile(user).current_state,
            AccountState::Normal
        );
    }
    let promotions_out_of_normal = coordinator
        .state_machine
        .get_transitions(1000)
        .into_iter()
        .filter(|t| t.from_state == AccountState::Normal)
        .count();
    assert_eq!(promotions_out_of_normal, 3);
}
