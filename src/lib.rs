//! # Incident Reasoning Core
//!
//! Stateful orchestration core for an incident-investigation assistant:
//! a hypothesis tree that tracks branching belief state about root cause,
//! a step-execution engine that interprets declarative remediation skills
//! with approval gates, retries and rollback, and a checkpoint store that
//! makes both durable and resumable across process restarts.
//!
//! ## Features
//!
//! - **Hypothesis Tree**: evidence-driven confidence scoring, branch/prune
//!   decisions, depth limiting, single-root-cause confirmation
//! - **Skill Execution**: condition evaluation, parameter templating,
//!   approval gating, timed dispatch, retry backoff, cooperative cancel
//! - **Checkpoints**: immutable per-investigation snapshots with a "latest"
//!   pointer and oldest-first retention, backed by SQLite
//!
//! ## Architecture
//!
//! ```text
//! Agent loop (external) → HypothesisTree / SkillExecutor → SQLite (checkpoints)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use incident_reasoning::config::Config;
//! use incident_reasoning::skills::{
//!     ExecutorConfig, HandlerDispatcher, SkillExecutor, SkillRegistry,
//! };
//! use incident_reasoning::storage::{SqliteStorage, Storage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(
//!         &config.database,
//!         config.limits.max_checkpoints_per_investigation,
//!     )
//!     .await?;
//!
//!     let registry = Arc::new(SkillRegistry::new());
//!     registry.load_builtins();
//!     let dispatcher = Arc::new(HandlerDispatcher::new());
//!     let executor = SkillExecutor::new(
//!         registry,
//!         dispatcher,
//!         ExecutorConfig::from_limits(&config.limits),
//!     );
//!
//!     let ctx = executor.start("clear-cache", HashMap::new()).await?;
//!     executor.advance(&ctx.session_id).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management for the orchestration core.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Hypothesis tree engine and evidence ledger.
pub mod hypothesis;
/// Audit report rendering for checkpoints.
pub mod report;
/// Declarative skills and the step-execution state machine.
pub mod skills;
/// Durable checkpoint storage.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
