//! Error types for relay
//!
//! Every fallible operation in the crate returns [`RelayResult`]. Raw errors
//! are turned into [`ClassifiedError`] values by [`classify`], which the retry
//! executor and the fallback walker both use to decide what happens next.

pub mod classify;
mod constructors;
mod types;

pub use classify::{ClassifiedError, ErrorKind, Severity, classify};
pub use types::{RelayError, RelayResult};
