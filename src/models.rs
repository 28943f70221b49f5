// =============================================================================
// Domain Models — Fraud Screening Core
// =============================================================================
//
// Wire and in-memory representations for game events, account state, rule
// triggers, and L2 arbitration results. These mirror the JSON shapes exchanged
// with game-server collaborators and the external arbitrator.
// =============================================================================

use chrono::Utc;
use serde::{Deserialize, Serialize};

// =============================================================================
// Account state machine
// =============================================================================

/// The four states an account can occupy. Transitions between these are
/// governed by `state_machine::ALLOWED_TRANSITIONS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountState {
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "RESTRICTED_WITHDRAWAL")]
    RestrictedWithdrawal,
    #[serde(rename = "UNDER_SURVEILLANCE")]
    UnderSurveillance,
    #[serde(rename = "BANNED")]
    Banned,
}

impl Default for AccountState {
    fn default() -> Self {
        AccountState::Normal
    }
}

impl std::fmt::Display for AccountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccountState::Normal => "NORMAL",
            AccountState::RestrictedWithdrawal => "RESTRICTED_WITHDRAWAL",
            AccountState::UnderSurveillance => "UNDER_SURVEILLANCE",
            AccountState::Banned => "BANNED",
        };
        write!(f, "{s}")
    }
}

/// Classification of the fraud pattern behind an L2 verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FraudType {
    #[serde(rename = "RMT_SMURFING")]
    RmtSmurfing,
    #[serde(rename = "RMT_DIRECT")]
    RmtDirect,
    #[serde(rename = "MONEY_LAUNDERING")]
    MoneyLaundering,
    #[serde(rename = "LEGITIMATE")]
    Legitimate,
}

impl std::fmt::Display for FraudType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FraudType::RmtSmurfing => "RMT_SMURFING",
            FraudType::RmtDirect => "RMT_DIRECT",
            FraudType::MoneyLaundering => "MONEY_LAUNDERING",
            FraudType::Legitimate => "LEGITIMATE",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Event ingestion shapes
// =============================================================================

/// Details of the economic action that triggered a `GameEventLog`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionDetails {
    #[serde(default)]
    pub currency_amount: i64,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub market_avg_price: Option<i64>,
}

/// Contextual metadata attached to an event by the upstream game server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMetadata {
    #[serde(default = "default_actor_level")]
    pub actor_level: i32,
    #[serde(default)]
    pub account_age_days: i32,
    #[serde(default)]
    pub recent_chat_log: Option<String>,
}

fn default_actor_level() -> i32 {
    1
}

impl Default for ContextMetadata {
    fn default() -> Self {
        Self {
            actor_level: default_actor_level(),
            account_age_days: 0,
            recent_chat_log: None,
        }
    }
}

/// A single economic transaction reported by the game server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEventLog {
    pub event_id: String,
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
    #[serde(default = "default_event_type")]
    pub event_type: String,
    pub actor_id: String,
    pub target_id: String,
    #[serde(default)]
    pub action_details: ActionDetails,
    #[serde(default)]
    pub context_metadata: ContextMetadata,
}

fn default_timestamp() -> String {
    format!("{}Z", Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.f"))
}

fn default_event_type() -> String {
    "TRADE".to_string()
}

// =============================================================================
// Account / window projection
// =============================================================================

/// A point-in-time read projection of an account's rolling window state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub current_state: AccountState,
    #[serde(default)]
    pub total_received_5min: i64,
    #[serde(default)]
    pub transaction_count_5min: u32,
    #[serde(default)]
    pub unique_senders_5min: u32,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            current_state: AccountState::Normal,
            total_received_5min: 0,
            transaction_count_5min: 0,
            unique_senders_5min: 0,
        }
    }
}

// =============================================================================
// L2 arbitration
// =============================================================================

/// Escalation payload sent to the L2 arbitrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub trigger_event: GameEventLog,
    #[serde(default)]
    pub related_events: Vec<GameEventLog>,
    #[serde(default)]
    pub triggered_rules: Vec<String>,
    pub user_profile: UserProfile,
}

/// The verdict returned by L2, whether from the external arbitrator or the
/// local rule-based fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationResult {
    pub target_id: String,
    pub is_fraud: bool,
    pub risk_score: i32,
    pub fraud_type: FraudType,
    pub recommended_action: AccountState,
    pub reasoning: String,
    #[serde(default)]
    pub evidence_event_ids: Vec<String>,
    pub confidence: f64,
}

impl ArbitrationResult {
    /// Clamp `risk_score` to `[0, 100]` and `confidence` to `[0.0, 1.0]`.
    pub fn clamp(mut self) -> Self {
        self.risk_score = self.risk_score.clamp(0, 100);
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

// =============================================================================
// Audit trail
// =============================================================================

/// A single recorded state transition, forming the audit trail for an
/// account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionLog {
    pub user_id: String,
    pub from_state: AccountState,
    pub to_state: AccountState,
    pub trigger: String,
    pub triggered_by_rule: String,
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
    #[serde(default)]
    pub evidence_summary: String,
}

/// Outcome of running the L1 deterministic rule engine against an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreeningResult {
    #[serde(default)]
    pub screened: bool,
    #[serde(default)]
    pub triggered_rules: Vec<String>,
    #[serde(default)]
    pub recommended_action: Option<AccountState>,
    #[serde(default)]
    pub needs_l2: bool,
}

// =============================================================================
// API request/response shapes
// =============================================================================

/// Body for `POST /api/v1/withdraw`.
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawRequest {
    pub user_id: String,
    pub amount: i64,
}

/// Result of running the fixed smurfing demo scenario end-to-end.
#[derive(Debug, Clone, Serialize)]
pub struct ShowcaseResult {
    pub target_user: String,
    #[serde(default)]
    pub triggered_rules: Vec<String>,
    pub withdraw_status_code: u16,
    pub latest_state: AccountState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_risk_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_reasoning: Option<String>,
}

// =============================================================================
// Transaction graph projection
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub state: AccountState,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}
