// =============================================================================
// Mirror — optional external read mirror (Redis)
// =============================================================================
//
// Best-effort fan-out of state-machine transitions and window snapshots to an
// external Redis instance so dashboards and alerting outside this process can
// observe account state without calling back into it. Disabled by default;
// enabled by setting `mirror_url` in `ScreeningConfig`.
//
// Mirror writes never block the event-processing critical section and never
// surface as errors to callers — a failed mirror write is logged and
// dropped.
// =============================================================================

use tracing::warn;

const KEY_PREFIX: &str = "fraudscreen";

/// Fan-out target for screening state. The in-memory no-op implementation is
/// used when no mirror is configured.
#[async_trait::async_trait]
pub trait Mirror: Send + Sync {
    async fn mirror_transition(&self, user_id: &str, to_state: &str, evidence: &str);
    async fn mirror_window(&self, user_id: &str, total_received: i64, transaction_count: u32);
}

/// No-op mirror used when `mirror_url` is not configured.
pub struct NoopMirror;

#[async_trait::async_trait]
impl Mirror for NoopMirror {
    async fn mirror_transition(&self, _user_id: &str, _to_state: &str, _evidence: &str) {}
    async fn mirror_window(&self, _user_id: &str, _total_received: i64, _transaction_count: u32) {}
}

/// Redis-backed mirror. Connection failures are swallowed and logged; the
/// caller's critical section never waits on or fails because of them.
pub struct RedisMirror {
    manager: redis::aio::ConnectionManager,
}

impl RedisMirror {
    pub async fn connect(url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }

    fn transition_key(user_id: &str) -> String {
        format!("{KEY_PREFIX}:transitions:{user_id}")
    }

    fn account_key(user_id: &str) -> String {
        format!("{KEY_PREFIX}:account:{user_id}")
    }
}

#[async_trait::async_trait]
impl Mirror for RedisMirror {
    async fn mirror_transition(&self, user_id: &str, to_state: &str, evidence: &str) {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let payload = serde_json::json!({ "to_state": to_state, "evidence": evidence }).to_string();
        if let Err(e) = conn
            .rpush::<_, _, ()>(Self::transition_key(user_id), payload)
            .await
        {
            warn!(user_id = %user_id, error = %e, "mirror: failed to push transition");
        }
    }

    async fn mirror_window(&self, user_id: &str, total_received: i64, transaction_count: u32) {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = conn
            .hset_multiple(
                Self::account_key(user_id),
                &[
                    ("total_received_5min", total_received.to_string()),
                    ("transaction_count_5min", transaction_count.to_string()),
                ],
            )
            .await;
        if let Err(e) = result {
            warn!(user_id = %user_id, error = %e, "mirror: failed to update account hash");
        }
    }
}

/// Build the configured mirror, falling back to a no-op on connection
/// failure or absent configuration.
pub async fn build_mirror(mirror_url: Option<&str>) -> Box<dyn Mirror> {
    match mirror_url {
        Some(url) => match RedisMirror::connect(url).await {
            Ok(mirror) => Box::new(mirror),
            Err(e) => {
                warn!(error = %e, "mirror: failed to connect, falling back to no-op");
                Box::new(NoopMirror)
            }
        },
        None => Box::new(NoopMirror),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_mirror_never_panics() {
        let mirror = NoopMirror;
        mirror.mirror_transition("u1", "BANNED", "test").await;
        mirror.mirror_window("u1", 100, 1).await;
    }

    #[tokio::test]
    async fn build_mirror_falls_back_without_config() {
        let mirror = build_mirror(None).await;
        mirror.mirror_transition("u1", "BANNED", "test").await;
    }
}
