//! Cooperative cancellation for running flights.
//!
//! The engine owns a root token. Each flight gets a child token, so shutting
//! the engine down interrupts every flight while cancelling one flight leaves
//! the rest running.

mod token;

pub use token::{CancelCallback, CancellationToken};
