// =============================================================================
// L1 Engine — deterministic rule screening
// =============================================================================
//
// Evaluates every inbound event against four fixed rules, in order:
//
//   R1  VOLUME           window total received >= `amount_threshold`
//   R2  FREQUENCY        transaction count within the window >=
//                        `tx_count_threshold`
//   R3  MARKET_ANOMALY   price paid >= `market_avg_multiplier` times the
//                        reported market average
//   R4  CHAT_SLANG       recent chat log matches a RMT/smurfing slang pattern
//
// A rule trigger appends its token ("R1".."R4") to
// `ScreeningResult::triggered_rules`. `screened` is set whenever any rule
// fires; `needs_l2` escalates to the arbitrator only when R4 fires — the
// chat-log signal is the one L1 can't fully resolve on its own. Rule
// evaluation order is fixed so that `triggered_rules` is deterministic and
// reproducible across runs.
// =============================================================================

use parking_lot::RwLock;
use regex::Regex;

use crate::models::{GameEventLog, GraphData, GraphLink, GraphNode, ScreeningResult};
use crate::window_store::WindowStore;

/// Regex matching RMT/smurfing slang commonly seen in chat logs attached to
/// suspicious transfers (bank transfer confirmations, amount shorthand,
/// acknowledgement slang, payment service mentions).
fn slang_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"振[り込]?込|D[でにて]確認|[0-9]+[kK千万]|りょ[。.]|PayPa[ly]|銀行|口座|送金|入金確認")
            .expect("slang pattern is a valid regex")
    })
}

/// Deterministic first-line rule engine.
pub struct L1Engine {
    windows: WindowStore,
    amount_threshold: i64,
    tx_count_threshold: u32,
    market_avg_multiplier: u32,
    recent_events: RwLock<Vec<GameEventLog>>,
    recent_events_cap: usize,
}

impl L1Engine {
    pub fn new(
        window_seconds: u64,
        amount_threshold: i64,
        tx_count_threshold: u32,
        market_avg_multiplier: u32,
        recent_events_cap: usize,
    ) -> Self {
        Self {
            windows: WindowStore::new(window_seconds),
            amount_threshold,
            tx_count_threshold,
            market_avg_multiplier,
            recent_events: RwLock::new(Vec::new()),
            recent_events_cap,
        }
    }

    /// Run the full rule battery against `event`, updating the target's
    /// rolling window and the bounded recent-events ring buffer.
    pub fn screen(&self, event: &GameEventLog) -> ScreeningResult {
        let snapshot = self.windows.add_and_snapshot(
            &event.target_id,
            &event.actor_id,
            event.action_details.currency_amount,
            &event.timestamp,
        );

        let mut triggered = Vec::new();

        // R1: VOLUME — window total, not the single event's amount.
        if snapshot.total_received >= self.amount_threshold {
            triggered.push("R1".to_string());
        }

        // R2: FREQUENCY
        if snapshot.transaction_count >= self.tx_count_threshold {
            triggered.push("R2".to_string());
        }

        // R3: MARKET_ANOMALY
        if let Some(market_avg) = event.action_details.market_avg_price {
            if market_avg > 0
                && event.action_details.currency_amount
                    >= market_avg * self.market_avg_multiplier as i64
            {
                triggered.push("R3".to_string());
            }
        }

        // R4: CHAT_SLANG
        if let Some(chat) = &event.context_metadata.recent_chat_log {
            if slang_pattern().is_match(chat) {
                triggered.push("R4".to_string());
            }
        }

        self.push_recent_event(event.clone());

        let screened = !triggered.is_empty();
        let needs_l2 = triggered.iter().any(|r| r == "R4");
        ScreeningResult {
            screened,
            triggered_rules: triggered,
            recommended_action: if screened { Some(crate::models::AccountState::RestrictedWithdrawal) } else { None },
            needs_l2,
        }
    }

    /// Current window snapshot for `target_id`, without mutating it.
    pub fn window_snapshot(&self, target_id: &str) -> crate::window_store::WindowSnapshot {
        self.windows.snapshot(target_id)
    }

    fn push_recent_event(&self, event: GameEventLog) {
        let mut recent = self.recent_events.write();
        recent.push(event);
        while recent.len() > self.recent_events_cap {
            recent.remove(0);
        }
    }

    /// Build the escalation payload sent to L2: the triggering event, the
    /// most recent events involving the same target, and the triggered rule
    /// names.
    pub fn build_analysis_request(
        &self,
        trigger_event: &GameEventLog,
        triggered_rules: Vec<String>,
        user_profile: crate::models::UserProfile,
    ) -> crate::models::AnalysisRequest {
        let related_events: Vec<GameEventLog> = self
            .recent_events
            .read()
            .iter()
            .filter(|e| e.target_id == trigger_event.target_id && e.event_id != trigger_event.event_id)
            .rev()
            .take(20)
            .cloned()
            .collect();

        crate::models::AnalysisRequest {
            trigger_event: trigger_event.clone(),
            related_events,
            triggered_rules,
            user_profile,
        }
    }

    /// Most recent events across all accounts, newest first, capped at
    /// `limit`.
    pub fn get_recent_events(&self, limit: usize) -> Vec<GameEventLog> {
        let recent = self.recent_events.read();
        recent.iter().rev().take(limit).cloned().collect()
    }

    /// Build a transaction graph from the in-memory recent-event history,
    /// suitable for a force-directed visualisation.
    pub fn get_graph_data(&self, states: impl Fn(&str) -> crate::models::AccountState) -> GraphData {
        use std::collections::HashMap;

        let recent = self.recent_events.read();
        let mut nodes: HashMap<String, GraphNode> = HashMap::new();
        let mut links: HashMap<(String, String), GraphLink> = HashMap::new();

        for event in recent.iter() {
            for id in [&event.actor_id, &event.target_id] {
                nodes.entry(id.clone()).or_insert_with(|| GraphNode {
                    id: id.clone(),
                    state: states(id),
                    label: id.clone(),
                });
            }

            let key = (event.actor_id.clone(), event.target_id.clone());
            let link = links.entry(key).or_insert_with(|| GraphLink {
                source: event.actor_id.clone(),
                target: event.target_id.clone(),
                amount: 0,
                count: 0,
            });
            link.amount += event.action_details.currency_amount;
            link.count += 1;
        }

        GraphData {
            nodes: nodes.into_values().collect(),
            links: links.into_values().collect(),
        }
    }
}
