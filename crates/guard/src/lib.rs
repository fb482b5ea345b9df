//! Admission Guard
//!
//! Sliding-window limiter keyed by source. Each source owns a small ring of
//! admission instants; unrelated sources never contend on the same lock.

mod config;
mod guard;
mod window;

pub use config::GuardConfig;
pub use guard::{Admission, AdmissionGuard};
