//! Connection admission.
//!
//! Bounds how many event streams run at once and queues the rest.

mod controller;
mod queue;
mod runner;

pub use controller::{Admission, AdmissionConfig, AdmissionController, DrainReport, QueueState};
pub use queue::WaitQueue;
