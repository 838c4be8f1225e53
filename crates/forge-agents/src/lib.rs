//! Artifact forge: generate, verify, repair and quarantine learning-exercise
//! artifacts with a bounded retry budget.
//!
//! The deterministic pieces (verdicts, run state, decisions, checks,
//! quarantine) live in the `coordination` crate. This crate adds the
//! model-backed producers, prompt building, artifact-id resolution, negative
//! verification, and the orchestrator that sequences them.

pub mod agents;
pub mod artifact_id;
pub mod config;
pub mod error;
pub mod negative;
pub mod orchestrator;
pub mod outcome;
pub mod prompts;
pub mod state_machine;

pub use agents::{
    CollaboratorResponse, Fixer, GenerationRequest, Generator, Idea, IdeaSource, RequestKind,
};
pub use config::ForgeConfig;
pub use error::OrchestratorError;
pub use orchestrator::Orchestrator;
pub use outcome::{RunOutcome, RunStatus};
pub use state_machine::{LifecycleState, StateMachine, TransitionRecord};
