//! Integration test common infrastructure.
//!
//! Provides an in-memory docgate stack per test and a store wrapper that
//! injects faults.

pub mod flaky;
pub mod harness;

#[allow(unused_imports)]
pub use flaky::FlakyStore;
#[allow(unused_imports)]
pub use harness::{Harness, rule, test_config};
