//! Shared test infrastructure for Cadence.
//!
//! Provides fixtures for agents, configuration and stage runs plus a
//! [`TestContext`] with a fake clock, so scenario tests stay deterministic.
//!
//! # Usage
//!
//! ```ignore
//! use cadence_tests::{StageConfigFixture, TestContext};
//!
//! #[test]
//! fn test_something() {
//!     let mut ctx = TestContext::new();
//!     let stage = ctx.completed_stage(&StageConfigFixture::rails_and_java());
//! }
//! ```

pub mod context;
pub mod fixtures;
pub mod helpers;

pub use context::TestContext;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,cadence_scheduler=debug")),
        )
        .with_test_writer()
        .try_init();
}
