//! Test utilities and fixtures for ngpack
//!
//! This crate provides shared test helpers that can be used by both
//! unit tests (#[cfg(test)]) and integration tests (tests/ directory).

pub mod fixtures;
pub mod logging;
pub mod mocks;
pub mod parser;
pub mod toolchain;

pub use fixtures::ProjectFixture;
pub use logging::init_test_logging;
pub use mocks::{MapResolver, RecordingPreprocessor};
pub use parser::FixtureParser;
pub use toolchain::{FakeToolchain, ToolchainStats};
