//! Stage instantiation and job rerun engine for Cadence.
//!
//! [`InstanceFactory`] expands pipeline and stage configuration into job
//! instances and builds rerun stages from completed ones.

pub mod context;
pub mod factory;
pub mod naming;
pub mod rerun;
pub mod strategy;

pub use context::SchedulingContext;
pub use factory::InstanceFactory;
pub use strategy::JobStrategy;
