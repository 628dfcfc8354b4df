//! Time-driven work: deferred message deletion and expiry enforcement.

pub mod deferred;
pub mod expiry;

pub use deferred::{defer, delete_after};
pub use expiry::{ExpiryEnforcer, MuteTransition, evaluate};
