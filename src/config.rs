// =============================================================================
// Screening Configuration — Hot-reloadable engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the fraud screening core. Every tunable
// threshold lives here so the service can be reconfigured without a restart.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry a serde default so that adding new fields never
// breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_window_seconds() -> u64 {
    300
}

fn default_amount_threshold() -> i64 {
    1_000_000
}

fn default_tx_count_threshold() -> u32 {
    10
}

fn default_market_avg_multiplier() -> u32 {
    100
}

fn default_recent_events_cap() -> usize {
    200
}

fn default_analyses_cap() -> usize {
    200
}

fn default_unique_senders_bonus_threshold() -> u32 {
    5
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_admin_token_env() -> String {
    "FRAUD_ADMIN_TOKEN".to_string()
}

fn default_l2_timeout_secs() -> u64 {
    10
}

// =============================================================================
// ScreeningConfig
// =============================================================================

/// Top-level runtime configuration for the screening core.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningConfig {
    // --- Window / aggregation -----------------------------------------------
    /// Sliding window width, in seconds, used for the 5-minute rolling
    /// aggregates.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    // --- L1 rule thresholds --------------------------------------------------
    /// R1: single-transaction currency amount that trips the volume rule.
    #[serde(default = "default_amount_threshold")]
    pub amount_threshold: i64,

    /// R2: transaction count within the window that trips the frequency rule.
    #[serde(default = "default_tx_count_threshold")]
    pub tx_count_threshold: u32,

    /// R3: multiplier over `market_avg_price` that trips the market anomaly
    /// rule.
    #[serde(default = "default_market_avg_multiplier")]
    pub market_avg_multiplier: u32,

    /// Bonus unique-sender count used by the L2 local fallback scorer.
    #[serde(default = "default_unique_senders_bonus_threshold")]
    pub unique_senders_bonus_threshold: u32,

    // --- Ring buffer / history caps -------------------------------------------
    /// Maximum number of recent events retained in memory for graph/read
    /// projections.
    #[serde(default = "default_recent_events_cap")]
    pub recent_events_cap: usize,

    /// Maximum number of L2 analyses retained in memory.
    #[serde(default = "default_analyses_cap")]
    pub analyses_cap: usize,

    // --- External collaborators ------------------------------------------------
    /// Optional Redis DSN used to mirror state for external observers. `None`
    /// disables mirroring.
    #[serde(default)]
    pub mirror_url: Option<String>,

    /// Optional SQLite file path used for best-effort persistence snapshots.
    /// `None` disables persistence.
    #[serde(default)]
    pub persistence_path: Option<String>,

    /// Base URL of the external arbitrator (L2) service. `None` forces the
    /// local rule-based fallback for every escalation.
    #[serde(default)]
    pub arbitrator_url: Option<String>,

    /// API key for the external arbitrator, if configured.
    #[serde(default)]
    pub arbitrator_api_key: Option<String>,

    /// Model identifier passed to the external arbitrator.
    #[serde(default)]
    pub arbitrator_model: Option<String>,

    /// Timeout, in seconds, for a single arbitrator call before falling back
    /// to the local scorer.
    #[serde(default = "default_l2_timeout_secs")]
    pub arbitrator_timeout_secs: u64,

    // --- Transport ---------------------------------------------------------
    /// Address the REST API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Name of the environment variable holding the admin bearer token.
    #[serde(default = "default_admin_token_env")]
    pub admin_token_env: String,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            amount_threshold: default_amount_threshold(),
            tx_count_threshold: default_tx_count_threshold(),
            market_avg_multiplier: default_market_avg_multiplier(),
            unique_senders_bonus_threshold: default_unique_senders_bonus_threshold(),
            recent_events_cap: default_recent_events_cap(),
            analyses_cap: default_analyses_cap(),
            mirror_url: None,
            persistence_path: None,
            arbitrator_url: None,
            arbitrator_api_key: None,
            arbitrator_model: None,
            arbitrator_timeout_secs: default_l2_timeout_secs(),
            bind_addr: default_bind_addr(),
            admin_token_env: default_admin_token_env(),
        }
    }
}

impl ScreeningConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read screening config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse screening config from {}", path.display()))?;

        info!(
            path = %path.display(),
            window_seconds = config.window_seconds,
            amount_threshold = config.amount_threshold,
            "screening config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    ///
    /// This prevents corruption if the process crashes mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise screening config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "screening config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = ScreeningConfig::default();
        assert_eq!(cfg.window_seconds, 300);
        assert_eq!(cfg.amount_threshold, 1_000_000);
        assert_eq!(cfg.tx_count_threshold, 10);
        assert_eq!(cfg.market_avg_multiplier, 100);
        assert_eq!(cfg.recent_events_cap, 200);
        assert_eq!(cfg.analyses_cap, 200);
        assert!(cfg.mirror_url.is_none());
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: ScreeningConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.window_seconds, 300);
        assert_eq!(cfg.admin_token_env, "FRAUD_ADMIN_TOKEN");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "amount_threshold": 2000000, "mirror_url": "redis://localhost" }"#;
        let cfg: ScreeningConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.amount_threshold, 2_000_000);
        assert_eq!(cfg.mirror_url.as_deref(), Some("redis://localhost"));
        assert_eq!(cfg.tx_count_threshold, 10);
        assert_eq!(cfg.window_seconds, 300);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = ScreeningConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: ScreeningConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.window_seconds, cfg2.window_seconds);
        assert_eq!(cfg.amount_threshold, cfg2.amount_threshold);
        assert_eq!(cfg.bind_addr, cfg2.bind_addr);
    }

    #[test]
    fn save_then_load_roundtrips_through_disk() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("screening_config_test_{:?}.json", std::thread::current().id()));
        let mut cfg = ScreeningConfig::default();
        cfg.amount_threshold = 42;
        cfg.save(&path).unwrap();
        let loaded = ScreeningConfig::load(&path).unwrap();
        assert_eq!(loaded.amount_threshold, 42);
        let _ = std::fs::remove_file(&path);
    }
}
