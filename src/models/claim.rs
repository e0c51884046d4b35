use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable record of seconds earned at a POI within one session window.
/// Written exactly once per finalized session, never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: String,
    pub user_id: String,
    pub poi_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub seconds_earned: u32,
    /// Calendar-month bucket ("2025-03") for seasonal aggregation.
    pub period_key: String,
}

/// Insert form of [`Claim`]; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClaim {
    pub user_id: String,
    pub poi_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub seconds_earned: u32,
    pub period_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub total_seconds: u32,
}
