//! Core mechanics for a location-based capture game: a stream of GPS fixes
//! is resolved against nearby POIs, a timed entry phase leads into
//! per-second capture counting with minute bonuses and a 60 s/day ceiling,
//! and finished sessions are finalized into immutable claims at a narrow
//! persistence boundary.
//!
//! The crate is an in-process component. Map rendering, auth, rankings and
//! the location subscription itself live with the embedding application;
//! they talk to this core through [`CaptureController`], the [`GameEvent`]
//! broadcast stream and the [`ClaimStore`] trait.

pub mod capture;
pub mod config;
pub mod finalize;
pub mod geo;
pub mod models;
pub mod proximity;
pub mod quota;
pub mod store;

pub use capture::{CaptureController, CapturePhase, CaptureSession, CaptureSnapshot, GameEvent};
pub use config::GameConfig;
pub use models::{Claim, Coordinates, LeaderboardEntry, LocationSample, NewClaim, Poi, PoiKind};
pub use proximity::ProximityState;
pub use store::{ClaimStore, Database, MemoryStore, StoreError};
