//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every ShutdownSignal observes cancellation
//!         → emitter fan-out task exits, subscriber queues close
//!         → pending Subscription::recv calls return None
//! ```
//!
//! # Design Decisions
//! - One coordinator per process (or per test), cloned signals per task
//! - Dropping the coordinator counts as shutdown

pub mod shutdown;

pub use shutdown::{Shutdown, ShutdownSignal};
