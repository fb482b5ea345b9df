//! Request Validation
//!
//! Field checks applied to API payloads before they reach the admission guard.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{ValidationConfig, Validator};
