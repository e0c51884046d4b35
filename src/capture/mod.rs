pub mod controller;
pub mod events;
pub mod state;

pub use controller::CaptureController;
pub use events::GameEvent;
pub use state::{CapturePhase, CaptureSession, CaptureSnapshot, CaptureState, CaptureTickOutcome};
