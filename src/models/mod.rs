pub mod claim;
pub mod location;
pub mod poi;

pub use claim::{Claim, LeaderboardEntry, NewClaim};
pub use location::LocationSample;
pub use poi::{Coordinates, Poi, PoiKind};
