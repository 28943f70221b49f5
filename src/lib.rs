// =============================================================================
// Fraud Screening Core — library root
// =============================================================================
//
// Real-time screening for a virtual-currency economy: every reported
// transaction is screened by deterministic rules (L1), escalated to an
// arbitrator with a local fallback when a rule fires (L2), and reflected in a
// per-account state machine that gates withdrawals.
//
// The binary entry point (`main.rs`) is a thin wrapper around this library so
// integration tests can drive the coordinator without spawning the HTTP
// server.
// =============================================================================

pub mod api;
pub mod app_state;
pub mod config;
pub mod coordinator;
pub mod demo;
pub mod l1_engine;
pub mod l2_engine;
pub mod lock_manager;
pub mod mirror;
pub mod models;
pub mod persistence;
pub mod state_machine;
pub mod window_store;
