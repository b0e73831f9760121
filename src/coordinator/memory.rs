//! In-process coordinator backend for single-node deployments and tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::time::Instant;

use super::{AdvancePosition, Coordinator, CoordinatorResult};
use crate::clock::QuizDate;

#[derive(Default)]
struct DayState {
    position: std::sync::Mutex<Option<AdvancePosition>>,
    finalize_counter: AtomicU64,
    join_inflight: AtomicI64,
}

/// Coordinator keeping all counters in process memory.
#[derive(Clone, Default)]
pub struct MemoryCoordinator {
    days: Arc<DashMap<QuizDate, Arc<DayState>>>,
    claims: Arc<DashMap<String, Instant>>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn day(&self, date: QuizDate) -> Arc<DayState> {
        self.days.entry(date).or_default().clone()
    }
}

impl Coordinator for MemoryCoordinator {
    fn position(
        &self,
        date: QuizDate,
    ) -> BoxFuture<'static, CoordinatorResult<Option<AdvancePosition>>> {
        let day = self.day(date);
        Box::pin(async move { Ok(*day.position.lock().expect("position lock")) })
    }

    fn advance_to(
        &self,
        date: QuizDate,
        position: AdvancePosition,
    ) -> BoxFuture<'static, CoordinatorResult<()>> {
        let day = self.day(date);
        Box::pin(async move {
            let mut guard = day.position.lock().expect("position lock");
            match *guard {
                Some(current) if current.index >= position.index => {}
                _ => *guard = Some(position),
            }
            Ok(())
        })
    }

    fn acquire_finalize_token(
        &self,
        date: QuizDate,
    ) -> BoxFuture<'static, CoordinatorResult<u64>> {
        let day = self.day(date);
        Box::pin(async move { Ok(day.finalize_counter.fetch_add(1, Ordering::SeqCst) + 1) })
    }

    fn acquire_join_slot(
        &self,
        date: QuizDate,
        cap: u32,
    ) -> BoxFuture<'static, CoordinatorResult<bool>> {
        let day = self.day(date);
        Box::pin(async move {
            let inflight = day.join_inflight.fetch_add(1, Ordering::SeqCst) + 1;
            if inflight > cap as i64 {
                day.join_inflight.fetch_sub(1, Ordering::SeqCst);
                return Ok(false);
            }
            Ok(true)
        })
    }

    fn release_join_slot(&self, date: QuizDate) -> BoxFuture<'static, CoordinatorResult<()>> {
        let day = self.day(date);
        Box::pin(async move {
            // Never drop below zero on unbalanced releases.
            let _ = day
                .join_inflight
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    (current > 0).then_some(current - 1)
                });
            Ok(())
        })
    }

    fn claim_key(
        &self,
        namespace: &'static str,
        key: String,
        ttl: Duration,
    ) -> BoxFuture<'static, CoordinatorResult<bool>> {
        let claims = self.claims.clone();
        Box::pin(async move {
            let now = Instant::now();
            let full_key = format!("{namespace}:{key}");

            // Drop expired claims lazily so the map stays bounded.
            claims.retain(|_, expires| *expires > now);

            use dashmap::mapref::entry::Entry;
            match claims.entry(full_key) {
                Entry::Occupied(_) => Ok(false),
                Entry::Vacant(entry) => {
                    entry.insert(now + ttl);
                    Ok(true)
                }
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, CoordinatorResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn date() -> QuizDate {
        "2025-03-02".parse().unwrap()
    }

    #[tokio::test]
    async fn finalize_token_is_issued_once_per_day() {
        let coordinator = MemoryCoordinator::new();
        assert_eq!(
            coordinator.acquire_finalize_token(date()).await.unwrap(),
            1
        );
        assert_eq!(
            coordinator.acquire_finalize_token(date()).await.unwrap(),
            2
        );

        let other: QuizDate = "2025-03-03".parse().unwrap();
        assert_eq!(coordinator.acquire_finalize_token(other).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn advancement_is_monotonic() {
        let coordinator = MemoryCoordinator::new();
        let now = Utc::now();
        coordinator
            .advance_to(date(), AdvancePosition { index: 5, started_at: now })
            .await
            .unwrap();
        // A duplicate tick for an earlier index must not move us backwards.
        coordinator
            .advance_to(date(), AdvancePosition { index: 3, started_at: now })
            .await
            .unwrap();

        let position = coordinator.position(date()).await.unwrap().unwrap();
        assert_eq!(position.index, 5);
    }

    #[tokio::test]
    async fn join_slots_respect_the_cap() {
        let coordinator = MemoryCoordinator::new();
        assert!(coordinator.acquire_join_slot(date(), 2).await.unwrap());
        assert!(coordinator.acquire_join_slot(date(), 2).await.unwrap());
        assert!(!coordinator.acquire_join_slot(date(), 2).await.unwrap());

        coordinator.release_join_slot(date()).await.unwrap();
        assert!(coordinator.acquire_join_slot(date(), 2).await.unwrap());
    }

    #[tokio::test]
    async fn claims_deduplicate_within_ttl() {
        let coordinator = MemoryCoordinator::new();
        let ttl = Duration::from_secs(60);
        assert!(
            coordinator
                .claim_key("webhook", "evt-1".into(), ttl)
                .await
                .unwrap()
        );
        assert!(
            !coordinator
                .claim_key("webhook", "evt-1".into(), ttl)
                .await
                .unwrap()
        );
        // Different namespace, same key.
        assert!(
            coordinator
                .claim_key("replay", "evt-1".into(), ttl)
                .await
                .unwrap()
        );
    }
}
