// =============================================================================
// Central Application State — Fraud Screening Core
// =============================================================================
//
// The single source of truth for the screening service. All subsystems hold
// Arc references to their own state; AppState ties them together for the
// REST API and background L2 dispatch.
//
// Thread safety:
//   - AtomicU64 for lock-free version tracking.
//   - parking_lot::RwLock for the config (read far more often than written).
//   - Subsystems manage their own interior mutability.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::ScreeningConfig;
use crate::coordinator::EventCoordinator;
use crate::l1_engine::L1Engine;
use crate::l2_engine::L2Engine;
use crate::lock_manager::LockManager;
use crate::mirror::{self, Mirror};
use crate::persistence::PersistenceStore;
use crate::state_machine::StateMachine;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter, bumped on every meaningful
    /// mutation (config change, transition, new analysis).
    pub state_version: AtomicU64,

    pub config: Arc<RwLock<ScreeningConfig>>,
    pub coordinator: Arc<EventCoordinator>,

    /// Instant when the service was started. Used for uptime reporting.
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Construct a new `AppState` from the given configuration. The mirror
    /// connection (if any) is attempted eagerly and falls back to a no-op on
    /// failure; persistence is opened eagerly and disabled on failure.
    pub async fn new(config: ScreeningConfig) -> Self {
        let l1 = Arc::new(L1Engine::new(
            config.window_seconds,
            config.amount_threshold,
            config.tx_count_threshold,
            config.market_avg_multiplier,
            config.recent_events_cap,
        ));

        let l2 = Arc::new(L2Engine::new(
            config.arbitrator_url.clone(),
            config.arbitrator_api_key.clone(),
            config.arbitrator_model.clone(),
            config.arbitrator_timeout_secs,
            config.unique_senders_bonus_threshold,
            config.analyses_cap,
        ));

        let state_machine = Arc::new(StateMachine::new());
        let locks = Arc::new(LockManager::new());

        let mirror: Arc<dyn Mirror> = mirror::build_mirror(config.mirror_url.as_deref()).await.into();

        let persistence = match &config.persistence_path {
            Some(path) => match PersistenceStore::new(path.clone()) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open persistence store, continuing without it");
                    None
                }
            },
            None => None,
        };

        let coordinator = Arc::new(EventCoordinator::new(
            l1, l2, state_machine, locks, mirror, persistence,
        ));

        Self {
            state_version: AtomicU64::new(1),
            config: Arc::new(RwLock::new(config)),
            coordinator,
            start_time: std::time::Instant::now(),
        }
    }

    /// Atomically increment the state version. Call this after every
    /// meaningful mutation.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }
}
