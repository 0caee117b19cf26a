//! Core domain models for ML pipelines
//!
//! This module defines the pipeline descriptor (parameters, steps, condition
//! nodes), its validation, the definition document rendered from it, and the
//! execution state tracked while it runs.

pub mod builder;
pub mod condition;
pub mod config;
pub mod context;
pub mod definition;
pub mod parameter;
pub mod pipeline;
pub mod state;
pub mod step;
pub mod validation;

pub use builder::*;
pub use condition::*;
pub use context::*;
pub use definition::*;
pub use parameter::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
pub use validation::*;
