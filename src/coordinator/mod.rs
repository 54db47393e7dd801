//! Message-driven coordinator: one thread owns the session, reacts to
//! parameter and annotation changes, trains on a worker and installs each new
//! model into the overlay at a fresh generation.

mod events;
mod runner;
mod state;

pub use events::{CoordinatorEvent, SessionStatus, SessionUpdate};
pub use runner::TrainingCoordinator;
pub use state::{Completion, SessionConfig, SessionState};
