//! Cadence Core
//!
//! Domain types and error handling for the Cadence stage and job
//! instantiation engine. This crate has minimal dependencies and defines the
//! shared vocabulary used by the scheduler, the CLI and the test fixtures.

pub mod agent;
pub mod build_cause;
pub mod clock;
pub mod elastic;
pub mod environment;
pub mod error;
pub mod ids;
pub mod interpolation;
pub mod job;
pub mod pipeline;
pub mod run;

pub use error::{Error, Result};
pub use ids::*;
