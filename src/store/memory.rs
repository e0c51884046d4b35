use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Claim, LeaderboardEntry, NewClaim, Poi};
use crate::quota;

use super::{ClaimStore, StoreError};

#[derive(Default)]
struct Inner {
    pois: HashMap<String, Poi>,
    claims: Vec<Claim>,
    king_override: Option<bool>,
    lookup_delay: Option<Duration>,
    fail_inserts: bool,
    fail_lookups: bool,
}

/// In-memory claim store with the same contract as [`super::Database`].
/// Useful for embedding without SQLite and as a controllable boundary in
/// tests: king results can be pinned, lookups delayed or failed, inserts
/// failed.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    daily_cap: u32,
}

impl MemoryStore {
    pub fn new(daily_cap: u32) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            daily_cap,
        }
    }

    pub fn claims(&self) -> Vec<Claim> {
        self.lock().claims.clone()
    }

    pub fn seed_claim(&self, claim: Claim) {
        self.lock().claims.push(claim);
    }

    /// Pin the king lookup to a fixed answer instead of computing it.
    pub fn set_king_override(&self, value: Option<bool>) {
        self.lock().king_override = value;
    }

    /// Delay king and quota lookups, to exercise in-flight cancellation.
    pub fn set_lookup_delay(&self, delay: Option<Duration>) {
        self.lock().lookup_delay = delay;
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.lock().fail_inserts = fail;
    }

    /// Fail the quota and king lookups, to exercise the discard-on-error
    /// path at entry completion.
    pub fn set_fail_lookups(&self, fail: bool) {
        self.lock().fail_lookups = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn simulate_latency(&self) {
        let delay = self.lock().lookup_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ClaimStore for MemoryStore {
    async fn daily_seconds_for_poi(
        &self,
        user_id: &str,
        poi_id: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.simulate_latency().await;
        let inner = self.lock();
        if inner.fail_lookups {
            return Err(StoreError::Backend(anyhow!("injected lookup failure")));
        }
        Ok(inner
            .claims
            .iter()
            .filter(|c| {
                c.user_id == user_id
                    && c.poi_id == poi_id
                    && c.start_time >= day_start
                    && c.start_time < day_end
            })
            .map(|c| c.seconds_earned)
            .sum())
    }

    async fn is_user_king_of_poi(&self, user_id: &str, poi_id: &str) -> Result<bool, StoreError> {
        self.simulate_latency().await;
        {
            let inner = self.lock();
            if inner.fail_lookups {
                return Err(StoreError::Backend(anyhow!("injected lookup failure")));
            }
            if let Some(pinned) = inner.king_override {
                return Ok(pinned);
            }
        }
        let top = self.poi_leaderboard(poi_id, 2).await?;
        Ok(match top.as_slice() {
            [] => false,
            [first] => first.user_id == user_id,
            [first, second, ..] => {
                first.user_id == user_id && first.total_seconds > second.total_seconds
            }
        })
    }

    async fn upsert_poi(&self, poi: &Poi) -> Result<(), StoreError> {
        self.lock().pois.insert(poi.id.clone(), poi.clone());
        Ok(())
    }

    async fn insert_claim(&self, claim: NewClaim) -> Result<Claim, StoreError> {
        let (day_start, day_end) = quota::local_day_bounds(claim.start_time);
        let mut inner = self.lock();

        if inner.fail_inserts {
            return Err(StoreError::Backend(anyhow!("injected insert failure")));
        }

        let used: u32 = inner
            .claims
            .iter()
            .filter(|c| {
                c.user_id == claim.user_id
                    && c.poi_id == claim.poi_id
                    && c.start_time >= day_start
                    && c.start_time < day_end
            })
            .map(|c| c.seconds_earned)
            .sum();
        if used >= self.daily_cap {
            return Err(StoreError::DailyCapExceeded {
                cap: self.daily_cap,
            });
        }

        let saved = Claim {
            id: Uuid::new_v4().to_string(),
            user_id: claim.user_id,
            poi_id: claim.poi_id,
            start_time: claim.start_time,
            end_time: claim.end_time,
            seconds_earned: claim.seconds_earned,
            period_key: claim.period_key,
        };
        inner.claims.push(saved.clone());
        Ok(saved)
    }

    async fn poi_leaderboard(
        &self,
        poi_id: &str,
        limit: u32,
    ) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let inner = self.lock();
        let mut totals: HashMap<&str, u32> = HashMap::new();
        for claim in inner.claims.iter().filter(|c| c.poi_id == poi_id) {
            *totals.entry(claim.user_id.as_str()).or_default() += claim.seconds_earned;
        }
        let mut entries: Vec<LeaderboardEntry> = totals
            .into_iter()
            .map(|(user_id, total_seconds)| LeaderboardEntry {
                user_id: user_id.to_string(),
                total_seconds,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.total_seconds
                .cmp(&a.total_seconds)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        entries.truncate(limit as usize);
        Ok(entries)
    }
}
