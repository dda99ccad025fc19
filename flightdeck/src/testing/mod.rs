//! Test doubles for flights and resource steps.
//!
//! - `ScriptedStep` plays back queued outcomes and records its calls
//! - `CallLog` collects calls from several steps in order
//! - `FakeCloud` is an in-memory `ResourceProvider` with injectable failures

mod cloud;
mod steps;

pub use cloud::FakeCloud;
pub use steps::{CallLog, ScriptedStep};
