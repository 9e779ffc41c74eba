//! Declarative remediation skills and the engine that executes them.
//!
//! This module provides:
//! - `Skill` / `SkillStep`: definitions of multi-step remediation workflows
//! - `SkillRegistry`: registration and lookup of skill definitions
//! - `SkillExecutor`: the step-execution state machine with approval gating
//! - `ToolDispatcher`: the seam to external tools
//! - Template/condition evaluation over a sandboxed expression grammar
//! - Built-in skills for common remediations

mod approval;
mod builtins;
mod dispatch;
mod executor;
mod registry;
pub mod template;
mod types;

pub use approval::{ApprovalDecision, ApprovalRequest, ApprovalState};
pub use builtins::*;
pub use dispatch::{ActionHandler, DispatchError, HandlerDispatcher, ToolDispatcher};
pub use executor::{
    ExecutionContext, ExecutionStatus, ExecutorConfig, SkillExecutor, StepOutcome, StepRecord,
    StepStatus,
};
pub use registry::SkillRegistry;
pub use types::*;
