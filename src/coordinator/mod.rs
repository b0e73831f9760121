//! Cluster-visible counters and fences: the current question index, the
//! per-day finalize token, join admission slots, and webhook replay guards.
//! The coordinator is a performance aid, never authoritative truth. Readers
//! fall back to store-derived values when it is away; fence paths fail
//! closed and rate-limit paths fail open.

pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::{
    sync::Mutex,
    time::{Instant, timeout},
};
use tracing::warn;

use crate::clock::QuizDate;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator unavailable: {message}")]
    Unavailable { message: String },
    #[error("coordinator operation timed out")]
    Timeout,
    #[error("coordinator circuit open")]
    CircuitOpen,
}

/// Advancement position for one quiz day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvancePosition {
    pub index: u32,
    pub started_at: DateTime<Utc>,
}

/// Backend contract. All operations are short and idempotent.
pub trait Coordinator: Send + Sync {
    /// Current advancement position, if the day has been armed.
    fn position(&self, date: QuizDate)
    -> BoxFuture<'static, CoordinatorResult<Option<AdvancePosition>>>;
    /// Monotonic move to `position`; lower indexes are ignored.
    fn advance_to(
        &self,
        date: QuizDate,
        position: AdvancePosition,
    ) -> BoxFuture<'static, CoordinatorResult<()>>;
    /// Per-day fence counter; the caller receiving 1 owns finalization.
    fn acquire_finalize_token(&self, date: QuizDate)
    -> BoxFuture<'static, CoordinatorResult<u64>>;
    /// Soft-capped in-flight join admission. True when a slot was granted.
    fn acquire_join_slot(
        &self,
        date: QuizDate,
        cap: u32,
    ) -> BoxFuture<'static, CoordinatorResult<bool>>;
    fn release_join_slot(&self, date: QuizDate) -> BoxFuture<'static, CoordinatorResult<()>>;
    /// Claim `key` under `namespace` for `ttl`. True on first sighting;
    /// false while a previous claim is still alive. Backs webhook
    /// idempotency and the replay guard.
    fn claim_key(
        &self,
        namespace: &'static str,
        key: String,
        ttl: Duration,
    ) -> BoxFuture<'static, CoordinatorResult<bool>>;
    fn health_check(&self) -> BoxFuture<'static, CoordinatorResult<()>>;
}

/// Soft timeout applied to every coordinator call.
const CALL_TIMEOUT: Duration = Duration::from_secs(2);
/// Consecutive failures before the circuit opens.
const BREAKER_THRESHOLD: u32 = 3;
/// How long the circuit stays open before probing again.
const BREAKER_COOLDOWN: Duration = Duration::from_secs(10);

/// Shared front door to the coordinator backend adding the soft timeout and
/// a consecutive-failure circuit breaker. Fail-open versus fail-closed is
/// decided by the caller-facing method, not the backend.
pub struct CoordinatorHandle {
    backend: Arc<dyn Coordinator>,
    consecutive_failures: AtomicU32,
    open_until: Mutex<Option<Instant>>,
}

impl CoordinatorHandle {
    pub fn new(backend: Arc<dyn Coordinator>) -> Self {
        Self {
            backend,
            consecutive_failures: AtomicU32::new(0),
            open_until: Mutex::new(None),
        }
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        fut: BoxFuture<'static, CoordinatorResult<T>>,
    ) -> CoordinatorResult<T> {
        {
            let mut open = self.open_until.lock().await;
            if let Some(until) = *open {
                if Instant::now() < until {
                    return Err(CoordinatorError::CircuitOpen);
                }
                *open = None;
            }
        }

        let outcome = match timeout(CALL_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(CoordinatorError::Timeout),
        };

        match &outcome {
            Ok(_) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            Err(err) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(operation, %err, failures, "coordinator call failed");
                if failures >= BREAKER_THRESHOLD {
                    let mut open = self.open_until.lock().await;
                    *open = Some(Instant::now() + BREAKER_COOLDOWN);
                }
            }
        }

        outcome
    }

    /// Read path: callers treat `Err` as "fall back to the store".
    pub async fn position(&self, date: QuizDate) -> CoordinatorResult<Option<AdvancePosition>> {
        self.call("position", self.backend.position(date)).await
    }

    pub async fn advance_to(
        &self,
        date: QuizDate,
        position: AdvancePosition,
    ) -> CoordinatorResult<()> {
        self.call("advance_to", self.backend.advance_to(date, position))
            .await
    }

    /// Fence path: errors propagate so finalization fails closed.
    pub async fn acquire_finalize_token(&self, date: QuizDate) -> CoordinatorResult<u64> {
        self.call(
            "acquire_finalize_token",
            self.backend.acquire_finalize_token(date),
        )
        .await
    }

    /// Rate-limit path: failure admits the caller (fail open). The second
    /// element is true when the limiter was degraded.
    pub async fn try_acquire_join_slot(&self, date: QuizDate, cap: u32) -> (bool, bool) {
        match self
            .call("acquire_join_slot", self.backend.acquire_join_slot(date, cap))
            .await
        {
            Ok(granted) => (granted, false),
            Err(_) => (true, true),
        }
    }

    pub async fn release_join_slot(&self, date: QuizDate) {
        let _ = self
            .call("release_join_slot", self.backend.release_join_slot(date))
            .await;
    }

    /// Fence-like path for webhook dedup: errors propagate so a wobbly
    /// coordinator cannot double-apply gateway events.
    pub async fn claim_key(
        &self,
        namespace: &'static str,
        key: String,
        ttl: Duration,
    ) -> CoordinatorResult<bool> {
        self.call("claim_key", self.backend.claim_key(namespace, key, ttl))
            .await
    }

    pub async fn health_check(&self) -> CoordinatorResult<()> {
        self.call("health_check", self.backend.health_check()).await
    }
}
