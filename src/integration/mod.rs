//! Wiring of the player into a running narrator

pub mod config;
pub mod orchestrator;

pub use config::NarratorConfig;
pub use orchestrator::{Orchestrator, OrchestratorHandle};
