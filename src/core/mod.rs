//! Core domain models
//!
//! This module defines the fundamental data structures that represent
//! pipelines, stages, matrix jobs, steps, and their configuration.

pub mod condition;
pub mod config;
pub mod context;
pub mod matrix;
pub mod pipeline;
pub mod plan;
pub mod secret;
pub mod stage;
pub mod state;
pub mod step;
pub mod trigger;

pub use condition::Condition;
pub use context::*;
pub use pipeline::*;
pub use plan::RunPlan;
pub use stage::*;
pub use state::*;
pub use step::*;
pub use trigger::{TriggerContext, TriggerEvent};
