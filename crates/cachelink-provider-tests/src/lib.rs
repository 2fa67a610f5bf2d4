//! Shared conformance test harness for cachelink backends.
//! Intended for use in integration tests with provider crates.

mod assertions;
mod capabilities;
mod contract;
mod env;
mod fixtures;
mod retry;
mod suite;

pub use assertions::*;
pub use capabilities::*;
pub use contract::*;
pub use env::*;
pub use fixtures::*;
pub use retry::*;
pub use suite::*;
