// src/lib.rs

//! Core orchestration engine for multi-tenant, multi-phase agentic coding
//! workflows: priority job queue, phase state machine, human-in-the-loop
//! approval broker, and agent tool-call security observer.
//!
//! This crate is the orchestration core only. The HTTP layer, the Redis-
//! backed queue/store implementations, and the code-agent transport are
//! all external collaborators that plug into the traits declared here
//! (`DurableStore`, `EventBus`, `JobQueueBackend`, `GitClient`,
//! `CredentialVault`, `CodeAgentClient`).

pub mod agent_client;
pub mod approval;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod eventbus;
pub mod metrics;
pub mod model;
pub mod observer;
pub mod orchestrator;
pub mod phases;
pub mod queue;
pub mod store;
pub mod worker;
pub mod workspace;

// Re-exporting the types most callers reach for first.
pub use config::CoreConfig;
pub use context::OrchestrationContext;
pub use error::{CoreError, PhaseError};
pub use model::{Task, TaskStatus};
pub use orchestrator::Orchestrator;
pub use worker::Worker;
