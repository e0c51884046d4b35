//! Persistence boundary. The core talks to it only through [`ClaimStore`];
//! the bundled backends are a worker-thread SQLite [`Database`] and an
//! in-memory [`MemoryStore`] for embedding and tests.

mod database;
mod memory;
mod migrations;

pub use database::Database;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Claim, LeaderboardEntry, NewClaim, Poi};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Server-side guard: the claim would land on a day that already
    /// reached the cap at this POI.
    #[error("daily cap of {cap}s already reached at this POI")]
    DailyCapExceeded { cap: u32 },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Sum of `seconds_earned` for this user at this POI with `start_time`
    /// in `[day_start, day_end)`. Zero when no claims match.
    async fn daily_seconds_for_poi(
        &self,
        user_id: &str,
        poi_id: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    /// True iff the user holds the strictly greatest all-time summed
    /// `seconds_earned` at the POI. Ties are not king.
    async fn is_user_king_of_poi(&self, user_id: &str, poi_id: &str) -> Result<bool, StoreError>;

    /// Idempotent by POI id.
    async fn upsert_poi(&self, poi: &Poi) -> Result<(), StoreError>;

    /// Insert exactly one claim. Fails with [`StoreError::DailyCapExceeded`]
    /// when the claim's day is already at the cap.
    async fn insert_claim(&self, claim: NewClaim) -> Result<Claim, StoreError>;

    /// All-time totals at a POI, highest first.
    async fn poi_leaderboard(
        &self,
        poi_id: &str,
        limit: u32,
    ) -> Result<Vec<LeaderboardEntry>, StoreError>;
}

/// Recover a typed [`StoreError`] that traveled through an `anyhow` chain.
pub(crate) fn into_store_error(err: anyhow::Error) -> StoreError {
    match err.downcast::<StoreError>() {
        Ok(store_err) => store_err,
        Err(other) => StoreError::Backend(other),
    }
}
