// =============================================================================
// Demo — scripted event generator for showcase/ops scenarios
// =============================================================================
//
// Generates fixed batches of game events for the demo/showcase endpoints: a
// batch of normal, unremarkable transfers, and a smurfing batch where a
// "boss" account fans payment out through a chain of mule accounts before it
// converges on a single target. Used for live demonstrations and manual QA,
// not for load testing.
// =============================================================================

use chrono::Utc;
use uuid::Uuid;

use crate::models::{ActionDetails, ContextMetadata, GameEventLog};

const NORMAL_PLAYERS: &[&str] = &["player_aki", "player_sora", "player_yui", "player_ren"];
const MULE_ACCOUNTS: &[&str] = &["mule_01", "mule_02", "mule_03", "mule_04", "mule_05"];
const BOSS_ACCOUNT: &str = "boss_account";

fn timestamp() -> String {
    format!("{}Z", Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.f"))
}

fn make_event(actor_id: &str, target_id: &str, amount: i64, chat: Option<&str>) -> GameEventLog {
    GameEventLog {
        event_id: Uuid::new_v4().to_string(),
        timestamp: timestamp(),
        event_type: "TRADE".to_string(),
        actor_id: actor_id.to_string(),
        target_id: target_id.to_string(),
        action_details: ActionDetails {
            currency_amount: amount,
            item_id: None,
            market_avg_price: None,
        },
        context_metadata: ContextMetadata {
            actor_level: 10,
            account_age_days: 90,
            recent_chat_log: chat.map(|s| s.to_string()),
        },
    }
}

/// Small amounts of ordinary trading between regular players, none of which
/// should trip any L1 rule.
pub fn generate_normal_events(count: usize) -> Vec<GameEventLog> {
    (0..count)
        .map(|i| {
            let actor = NORMAL_PLAYERS[i % NORMAL_PLAYERS.len()];
            let target = NORMAL_PLAYERS[(i + 1) % NORMAL_PLAYERS.len()];
            make_event(actor, target, 500 + (i as i64 * 17) % 2_000, None)
        })
        .collect()
}

/// A layered smurfing scenario: the boss account fans a large payout through
/// a chain of mule accounts, each transfer individually below the volume
/// threshold but converging on a single final target with chat-log evidence
/// of a real-money-trade handoff.
pub fn generate_smurfing_events(target_user: &str) -> Vec<GameEventLog> {
    let mut events = Vec::new();
    let mut previous = BOSS_ACCOUNT;

    for mule in MULE_ACCOUNTS {
        events.push(make_event(previous, mule, 150_000, None));
        previous = mule;
    }

    events.push(make_event(
        previous,
        target_user,
        1_500_000,
        Some("銀行振込確認 D今確認 りょ。"),
    ));

    events
}
