//! Shared test fixtures for the automatosx workspace — one crate of
//! reusable setup so individual crates' `tests/` directories stay
//! focused on the behavior under test.

pub mod fixtures;
pub mod providers;

pub use fixtures::{ProfileBuilder, TestProject};
pub use providers::mock_provider_descriptor;
