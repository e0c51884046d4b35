use std::time::Duration;

/// Tunables for the capture loop. Defaults mirror the production rules:
/// 50 m claim radius, 10 s entry (5 s for the sitting king), 60 capturable
/// seconds per POI per day, 10 bonus seconds per completed minute.
///
/// Tick intervals are configurable so tests can drive the loop under a
/// virtual clock without rewiring the controller.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub claim_radius_m: f64,
    pub entry_duration: Duration,
    pub king_entry_duration: Duration,
    pub max_daily_seconds: u32,
    pub minute_bonus_seconds: u32,
    pub entry_tick: Duration,
    pub capture_tick: Duration,
    /// Entry-progress events go out every N entry ticks.
    pub heartbeat_every_ticks: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            claim_radius_m: 50.0,
            entry_duration: Duration::from_secs(10),
            king_entry_duration: Duration::from_secs(5),
            max_daily_seconds: 60,
            minute_bonus_seconds: 10,
            entry_tick: Duration::from_millis(100),
            capture_tick: Duration::from_secs(1),
            heartbeat_every_ticks: 10,
        }
    }
}
