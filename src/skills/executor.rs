//! Step-execution state machine for remediation skills.
//!
//! Interprets a skill's ordered steps against a per-invocation execution
//! context: condition evaluation, parameter templating, approval gating,
//! timed action dispatch, error policy with retry backoff, and result
//! storage. `advance` calls are serialized per context; independent contexts
//! run fully concurrently.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::approval::{ApprovalDecision, ApprovalRequest, ApprovalState};
use super::dispatch::ToolDispatcher;
use super::registry::SkillRegistry;
use super::template::{self, Scope};
use super::types::{BackoffMode, OnErrorPolicy, Skill, SkillStep};
use crate::config::LimitsConfig;
use crate::error::{ExecutionError, ExecutionResult};

/// Skill-level execution status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Steps are being executed.
    #[default]
    Running,
    /// Suspended at the approval gate.
    Paused,
    /// All steps finished; terminal.
    Completed,
    /// A step failed unrecoverably, approval was denied/timed out, or the
    /// skill timed out; terminal.
    Failed,
    /// Cancelled at a step boundary; terminal.
    Cancelled,
}

impl ExecutionStatus {
    /// Whether the context can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Paused => write!(f, "paused"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Dispatch succeeded.
    Success,
    /// Dispatch failed (recorded error).
    Error,
    /// Condition evaluated false; never dispatched.
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Error => write!(f, "error"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Stored result of one step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Raw result from the dispatched action (`null` when skipped or failed).
    pub result: Value,
    /// Wall-clock execution time, including retries.
    pub duration_ms: i64,
    /// Terminal step status.
    pub status: StepStatus,
    /// Error detail when `status` is `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Dispatch attempts made (1 + retries).
    pub attempts: u32,
}

/// Mutable state of one skill invocation.
///
/// Exclusively owned by that invocation; terminal states are immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Session identifier for this invocation.
    pub session_id: String,
    /// The skill being executed.
    pub skill_id: String,
    /// Validated parameter values, defaults applied.
    pub params: HashMap<String, Value>,
    /// Step results keyed by step id.
    pub steps: HashMap<String, StepRecord>,
    /// Index of the next step to execute.
    pub current_step_index: usize,
    /// Skill-level status.
    pub status: ExecutionStatus,
    /// Outstanding or resolved approval for the current gated step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_approval: Option<ApprovalRequest>,
    /// Cumulative step execution time, bounded by the skill timeout.
    pub executed_ms: u64,
    /// Human-readable reason for a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Rollback command resolved when the skill failed or was cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_command: Option<String>,
    /// When the invocation started.
    pub created_at: DateTime<Utc>,
    /// When the context last changed.
    pub updated_at: DateTime<Utc>,
}

impl ExecutionContext {
    fn new(skill_id: impl Into<String>, params: HashMap<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            skill_id: skill_id.into(),
            params,
            steps: HashMap::new(),
            current_step_index: 0,
            status: ExecutionStatus::Running,
            pending_approval: None,
            executed_ms: 0,
            failure_reason: None,
            rollback_command: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Outcome of one `advance` call.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The step ran to a terminal record (success, or a recorded error under
    /// the `continue` policy).
    Executed(StepRecord),
    /// The step's condition evaluated false; nothing was dispatched.
    Skipped(StepRecord),
    /// No-op replay of an already-terminal step; nothing was dispatched.
    Replayed(StepRecord),
    /// The context paused at the approval gate.
    AwaitingApproval(ApprovalRequest),
    /// The skill reached a terminal status.
    Terminal {
        /// Terminal context status.
        status: ExecutionStatus,
        /// Human-readable reason.
        reason: Option<String>,
        /// Resolved rollback command, if the skill declares one.
        rollback_command: Option<String>,
    },
}

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How long approval requests stay pending before timing out.
    pub approval_timeout_ms: u64,
    /// Default per-step dispatch timeout.
    pub step_timeout_ms: u64,
    /// Identity exposed as the `user` built-in in templates.
    pub user: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            approval_timeout_ms: 3_600_000,
            step_timeout_ms: 30_000,
            user: "operator".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Derive executor configuration from the application limits
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            approval_timeout_ms: limits.approval_timeout_ms,
            step_timeout_ms: limits.step_timeout_ms,
            ..Self::default()
        }
    }
}

/// The step-execution state machine.
pub struct SkillExecutor {
    registry: Arc<SkillRegistry>,
    dispatcher: Arc<dyn ToolDispatcher>,
    config: ExecutorConfig,
    contexts: RwLock<HashMap<String, Arc<Mutex<ExecutionContext>>>>,
    /// Approval id -> session id, for resolution lookups.
    approvals: RwLock<HashMap<String, String>>,
}

impl SkillExecutor {
    /// Create a new executor over the given registry and dispatcher
    pub fn new(
        registry: Arc<SkillRegistry>,
        dispatcher: Arc<dyn ToolDispatcher>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            config,
            contexts: RwLock::new(HashMap::new()),
            approvals: RwLock::new(HashMap::new()),
        }
    }

    /// Start a skill invocation: validate parameters, apply defaults, and
    /// create a fresh context in `Running` state at step index 0.
    pub async fn start(
        &self,
        skill_id: &str,
        params: HashMap<String, Value>,
    ) -> ExecutionResult<ExecutionContext> {
        let skill = self.skill(skill_id)?;

        let mut resolved = params;
        for (name, spec) in &skill.params {
            match resolved.get(name) {
                Some(value) => {
                    if !spec.param_type.matches(value) {
                        return Err(ExecutionError::TypeMismatch {
                            name: name.clone(),
                            expected: spec.param_type.to_string(),
                            actual: json_type_name(value).to_string(),
                        });
                    }
                }
                None => {
                    if let Some(default) = &spec.default {
                        resolved.insert(name.clone(), default.clone());
                    } else if spec.required {
                        return Err(ExecutionError::MissingParameter { name: name.clone() });
                    }
                }
            }
        }

        let context = ExecutionContext::new(skill_id, resolved);
        info!(
            session_id = %context.session_id,
            skill_id,
            steps = skill.steps.len(),
            "Skill execution started"
        );

        self.insert_context(context.clone());
        Ok(context)
    }

    /// Re-adopt a context restored from a checkpoint.
    ///
    /// A paused context resumes purely from persisted state: its pending
    /// approval is re-indexed so `resolve_approval` finds it again.
    pub async fn restore(&self, context: ExecutionContext) -> ExecutionResult<ExecutionContext> {
        self.skill(&context.skill_id)?;
        if let Some(request) = &context.pending_approval {
            if request.is_pending() {
                self.approvals
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(request.id.clone(), context.session_id.clone());
            }
        }
        info!(
            session_id = %context.session_id,
            status = %context.status,
            "Execution context restored"
        );
        self.insert_context(context.clone());
        Ok(context)
    }

    /// Read-only view of a context
    pub async fn get_context(&self, session_id: &str) -> Option<ExecutionContext> {
        let arc = {
            let contexts = self.contexts.read().unwrap_or_else(|e| e.into_inner());
            contexts.get(session_id).cloned()
        }?;
        let ctx = arc.lock().await;
        Some(ctx.clone())
    }

    /// Execute (or replay) the step at the current index.
    ///
    /// Re-running `advance` on a context whose current step is already
    /// terminal returns the stored record without re-dispatching.
    pub async fn advance(&self, session_id: &str) -> ExecutionResult<StepOutcome> {
        let arc = self.context_arc(session_id)?;
        let mut ctx = arc.lock().await;
        let skill = self.skill(&ctx.skill_id)?;

        if ctx.status.is_terminal() {
            return Ok(self.replay_outcome(&ctx, &skill));
        }

        if ctx.status == ExecutionStatus::Paused {
            return self.advance_gated(&mut ctx, &skill);
        }

        if ctx.current_step_index >= skill.steps.len() {
            ctx.status = ExecutionStatus::Completed;
            ctx.touch();
            return Ok(StepOutcome::Terminal {
                status: ExecutionStatus::Completed,
                reason: Some("all steps completed".to_string()),
                rollback_command: None,
            });
        }
        let step = skill.steps[ctx.current_step_index].clone();

        // Safe resume: a terminal record at the cursor is replayed, never
        // re-dispatched.
        if let Some(record) = ctx.steps.get(&step.id) {
            debug!(session_id, step_id = %step.id, "Replaying terminal step record");
            return Ok(StepOutcome::Replayed(record.clone()));
        }

        // An approved gate for this step resumes directly at dispatch with
        // the parameters the approver saw.
        if let Some(request) = ctx.pending_approval.clone() {
            if request.step_id == step.id && request.state == ApprovalState::Approved {
                return self
                    .dispatch_step(&mut ctx, &skill, &step, request.parameters)
                    .await;
            }
        }

        let scope = self.scope(&ctx);

        // Phase 1: condition
        if let Some(condition) = &step.condition {
            match template::evaluate_condition(condition, &scope) {
                Ok(true) => {}
                Ok(false) => {
                    let record = StepRecord {
                        result: Value::Null,
                        duration_ms: 0,
                        status: StepStatus::Skipped,
                        error: None,
                        attempts: 0,
                    };
                    ctx.steps.insert(step.id.clone(), record.clone());
                    ctx.current_step_index += 1;
                    if ctx.current_step_index >= skill.steps.len() {
                        ctx.status = ExecutionStatus::Completed;
                    }
                    ctx.touch();
                    info!(session_id, step_id = %step.id, "Step skipped: condition false");
                    return Ok(StepOutcome::Skipped(record));
                }
                Err(e) => {
                    return self.step_failed(&mut ctx, &skill, &step, e.to_string(), 0, 1);
                }
            }
        }

        // Phase 2: parameter templates
        let resolved = match template::resolve_parameters(&step.parameters, &scope) {
            Ok(resolved) => resolved,
            Err(e) => {
                let message = ExecutionError::Template(e).to_string();
                return self.step_failed(&mut ctx, &skill, &step, message, 0, 1);
            }
        };
        let params = Value::Object(resolved.into_iter().collect());

        // Phase 3: approval gate
        if step.requires_approval {
            if let Some(existing) = &ctx.pending_approval {
                if existing.is_pending() {
                    return Err(ExecutionError::ApprovalAlreadyPending {
                        session_id: ctx.session_id.clone(),
                    });
                }
            }
            let request = ApprovalRequest::new(
                &ctx.session_id,
                &skill.id,
                &step.id,
                &step.action,
                params,
                skill.risk_level,
                self.config.approval_timeout_ms,
            )
            .with_rollback(self.resolve_rollback(&skill, &scope));

            self.approvals
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(request.id.clone(), ctx.session_id.clone());
            ctx.pending_approval = Some(request.clone());
            ctx.status = ExecutionStatus::Paused;
            ctx.touch();

            info!(
                session_id,
                step_id = %step.id,
                approval_id = %request.id,
                risk = %request.risk_level,
                "Execution paused awaiting approval"
            );
            return Ok(StepOutcome::AwaitingApproval(request));
        }

        // Phases 4-7: dispatch, result storage, error policy, completion
        self.dispatch_step(&mut ctx, &skill, &step, params).await
    }

    /// Cancel a running or paused execution.
    ///
    /// Cooperative: `advance` holds the context lock for the whole step, so a
    /// cancel never interrupts a step mid-dispatch; it lands at the next step
    /// boundary and surfaces the rollback command.
    pub async fn cancel(&self, session_id: &str) -> ExecutionResult<ExecutionContext> {
        let arc = self.context_arc(session_id)?;
        let mut ctx = arc.lock().await;

        if ctx.status.is_terminal() {
            return Err(ExecutionError::InvalidState {
                session_id: session_id.to_string(),
                status: ctx.status.to_string(),
                operation: "cancel".to_string(),
            });
        }

        let rollback = self
            .registry
            .get(&ctx.skill_id)
            .and_then(|skill| self.resolve_rollback(&skill, &self.scope(&ctx)));

        ctx.status = ExecutionStatus::Cancelled;
        ctx.failure_reason = Some("cancelled by operator before next step".to_string());
        ctx.rollback_command = rollback;
        ctx.touch();

        info!(session_id, "Skill execution cancelled");
        Ok(ctx.clone())
    }

    /// Resolve a pending approval. First resolution wins.
    ///
    /// `Approved` resumes the state machine at the gated step's dispatch
    /// phase (on the next `advance`); `Denied` fails the skill with the
    /// rollback command surfaced. A request past its window auto-resolves to
    /// `Timeout` and the late decision is rejected as `AlreadyResolved`.
    pub async fn resolve_approval(
        &self,
        approval_id: &str,
        decision: ApprovalDecision,
        approver: &str,
    ) -> ExecutionResult<ApprovalRequest> {
        let session_id = {
            let approvals = self.approvals.read().unwrap_or_else(|e| e.into_inner());
            approvals
                .get(approval_id)
                .cloned()
                .ok_or_else(|| ExecutionError::ApprovalNotFound {
                    approval_id: approval_id.to_string(),
                })?
        };
        let arc = self.context_arc(&session_id)?;
        let mut ctx = arc.lock().await;

        let request = match &ctx.pending_approval {
            Some(request) if request.id == approval_id => request.clone(),
            _ => {
                return Err(ExecutionError::ApprovalNotFound {
                    approval_id: approval_id.to_string(),
                })
            }
        };

        if !request.is_pending() {
            return Err(ExecutionError::AlreadyResolved {
                approval_id: approval_id.to_string(),
                state: request.state.to_string(),
            });
        }
        if ctx.status.is_terminal() {
            return Err(ExecutionError::InvalidState {
                session_id: session_id.clone(),
                status: ctx.status.to_string(),
                operation: "resolve_approval".to_string(),
            });
        }

        // Lazy expiry: the window is checked when the gate is consulted
        if request.is_expired(Utc::now()) {
            let rollback = request.rollback_command.clone();
            if let Some(pending) = ctx.pending_approval.as_mut() {
                pending.expire();
            }
            self.fail_context(&mut ctx, "approval request timed out", rollback);
            warn!(approval_id, "Late resolution lost to approval timeout");
            return Err(ExecutionError::AlreadyResolved {
                approval_id: approval_id.to_string(),
                state: ApprovalState::Timeout.to_string(),
            });
        }

        let resolved = {
            let pending = ctx
                .pending_approval
                .as_mut()
                .ok_or_else(|| ExecutionError::ApprovalNotFound {
                    approval_id: approval_id.to_string(),
                })?;
            pending.resolve(decision, approver);
            pending.clone()
        };

        match decision {
            ApprovalDecision::Approved => {
                ctx.status = ExecutionStatus::Running;
                ctx.touch();
                info!(approval_id, approver, "Approval granted, execution resumed");
            }
            ApprovalDecision::Denied => {
                let rollback = resolved.rollback_command.clone();
                self.fail_context(
                    &mut ctx,
                    format!("approval denied by {}", approver),
                    rollback,
                );
                info!(approval_id, approver, "Approval denied, execution failed");
            }
        }

        Ok(resolved)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn skill(&self, skill_id: &str) -> ExecutionResult<Skill> {
        self.registry
            .get(skill_id)
            .ok_or_else(|| ExecutionError::SkillNotFound {
                skill_id: skill_id.to_string(),
            })
    }

    fn insert_context(&self, context: ExecutionContext) {
        self.contexts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                context.session_id.clone(),
                Arc::new(Mutex::new(context)),
            );
    }

    fn context_arc(&self, session_id: &str) -> ExecutionResult<Arc<Mutex<ExecutionContext>>> {
        let contexts = self.contexts.read().unwrap_or_else(|e| e.into_inner());
        contexts
            .get(session_id)
            .cloned()
            .ok_or_else(|| ExecutionError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    fn scope(&self, ctx: &ExecutionContext) -> Scope {
        let results: HashMap<String, Value> = ctx
            .steps
            .iter()
            .map(|(id, record)| (id.clone(), record.result.clone()))
            .collect();
        Scope::new(&ctx.params, &results, &ctx.session_id, &self.config.user)
    }

    fn resolve_rollback(&self, skill: &Skill, scope: &Scope) -> Option<String> {
        let rollback = skill.rollback.as_ref()?;
        match template::resolve_template(rollback, scope) {
            Ok(Value::String(s)) => Some(s),
            Ok(other) => Some(other.to_string()),
            // Surface the raw template rather than nothing
            Err(_) => Some(rollback.clone()),
        }
    }

    fn fail_context(
        &self,
        ctx: &mut ExecutionContext,
        reason: impl Into<String>,
        rollback: Option<String>,
    ) {
        ctx.status = ExecutionStatus::Failed;
        ctx.failure_reason = Some(reason.into());
        ctx.rollback_command = rollback;
        ctx.touch();
    }

    /// Paused contexts only move when the gate resolves or expires
    fn advance_gated(
        &self,
        ctx: &mut ExecutionContext,
        _skill: &Skill,
    ) -> ExecutionResult<StepOutcome> {
        let request = match ctx.pending_approval.clone() {
            Some(request) => request,
            None => {
                return Err(ExecutionError::InvalidState {
                    session_id: ctx.session_id.clone(),
                    status: ctx.status.to_string(),
                    operation: "advance".to_string(),
                })
            }
        };

        if request.is_expired(Utc::now()) {
            let rollback = request.rollback_command.clone();
            if let Some(pending) = ctx.pending_approval.as_mut() {
                pending.expire();
            }
            self.fail_context(ctx, "approval request timed out", rollback);
            warn!(session_id = %ctx.session_id, approval_id = %request.id, "Approval timed out");
            return Ok(StepOutcome::Terminal {
                status: ExecutionStatus::Failed,
                reason: ctx.failure_reason.clone(),
                rollback_command: ctx.rollback_command.clone(),
            });
        }

        Ok(StepOutcome::AwaitingApproval(request))
    }

    /// Record a step failure without dispatch (condition or template errors),
    /// honoring the step's error policy.
    fn step_failed(
        &self,
        ctx: &mut ExecutionContext,
        skill: &Skill,
        step: &SkillStep,
        message: String,
        duration_ms: i64,
        attempts: u32,
    ) -> ExecutionResult<StepOutcome> {
        warn!(
            session_id = %ctx.session_id,
            step_id = %step.id,
            error = %message,
            "Step failed before dispatch"
        );
        let record = StepRecord {
            result: Value::Null,
            duration_ms,
            status: StepStatus::Error,
            error: Some(message.clone()),
            attempts,
        };
        ctx.steps.insert(step.id.clone(), record.clone());
        ctx.touch();

        if step.on_error == OnErrorPolicy::Continue {
            ctx.current_step_index += 1;
            if ctx.current_step_index >= skill.steps.len() {
                ctx.status = ExecutionStatus::Completed;
            }
            return Ok(StepOutcome::Executed(record));
        }

        let rollback = self.resolve_rollback(skill, &self.scope(ctx));
        self.fail_context(
            ctx,
            format!("step '{}' failed: {}", step.id, message),
            rollback,
        );
        Ok(StepOutcome::Terminal {
            status: ExecutionStatus::Failed,
            reason: ctx.failure_reason.clone(),
            rollback_command: ctx.rollback_command.clone(),
        })
    }

    /// Phases 4-7 of `advance`: timed dispatch with retry backoff, result
    /// storage, error policy, and completion/skill-timeout checks.
    async fn dispatch_step(
        &self,
        ctx: &mut ExecutionContext,
        skill: &Skill,
        step: &SkillStep,
        params: Value,
    ) -> ExecutionResult<StepOutcome> {
        let step_timeout =
            Duration::from_millis(step.timeout_ms.unwrap_or(self.config.step_timeout_ms));
        let max_attempts = if step.on_error == OnErrorPolicy::Retry {
            1 + step.retry_count
        } else {
            1
        };

        let started = tokio::time::Instant::now();
        let mut attempt: u32 = 1;
        let last_error: String;

        loop {
            debug!(
                session_id = %ctx.session_id,
                step_id = %step.id,
                action = %step.action,
                attempt,
                "Dispatching step"
            );
            let outcome =
                tokio::time::timeout(step_timeout, self.dispatcher.execute(&step.action, &params))
                    .await;

            let error = match outcome {
                Ok(Ok(result)) => {
                    let duration = started.elapsed().as_millis() as i64;
                    let record = StepRecord {
                        result,
                        duration_ms: duration,
                        status: StepStatus::Success,
                        error: None,
                        attempts: attempt,
                    };
                    ctx.executed_ms += duration as u64;
                    ctx.steps.insert(step.id.clone(), record.clone());
                    ctx.current_step_index += 1;
                    ctx.touch();

                    if let Some(timeout_ms) = skill.timeout_ms {
                        if ctx.executed_ms > timeout_ms {
                            // The in-flight step completed naturally; the
                            // budget overrun still fails the skill.
                            let reason = ExecutionError::SkillTimeout {
                                skill_id: skill.id.clone(),
                                timeout_ms,
                            }
                            .to_string();
                            let rollback = self.resolve_rollback(skill, &self.scope(ctx));
                            self.fail_context(ctx, reason, rollback);
                            return Ok(StepOutcome::Terminal {
                                status: ExecutionStatus::Failed,
                                reason: ctx.failure_reason.clone(),
                                rollback_command: ctx.rollback_command.clone(),
                            });
                        }
                    }

                    if ctx.current_step_index >= skill.steps.len() {
                        ctx.status = ExecutionStatus::Completed;
                        ctx.touch();
                    }

                    info!(
                        session_id = %ctx.session_id,
                        step_id = %step.id,
                        duration_ms = duration,
                        attempts = attempt,
                        "Step completed"
                    );
                    return Ok(StepOutcome::Executed(record));
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => ExecutionError::StepTimeout {
                    step_id: step.id.clone(),
                    timeout_ms: step_timeout.as_millis() as u64,
                }
                .to_string(),
            };

            warn!(
                session_id = %ctx.session_id,
                step_id = %step.id,
                attempt,
                error = %error,
                "Step attempt failed"
            );

            if attempt < max_attempts {
                let delay = backoff_delay(step.retry_backoff, step.retry_delay_ms, attempt);
                // Retries still respect the overall skill budget
                if let Some(timeout_ms) = skill.timeout_ms {
                    let projected = ctx.executed_ms
                        + started.elapsed().as_millis() as u64
                        + delay.as_millis() as u64;
                    if projected > timeout_ms {
                        last_error = format!("{} (retry budget exhausted)", error);
                        break;
                    }
                }
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            last_error = error;
            break;
        }

        let duration = started.elapsed().as_millis() as i64;
        ctx.executed_ms += duration as u64;
        let record = StepRecord {
            result: Value::Null,
            duration_ms: duration,
            status: StepStatus::Error,
            error: Some(last_error.clone()),
            attempts: attempt,
        };
        ctx.steps.insert(step.id.clone(), record.clone());
        ctx.touch();

        // `retry` exhausting its attempts behaves as `abort`
        if step.on_error == OnErrorPolicy::Continue {
            ctx.current_step_index += 1;
            if ctx.current_step_index >= skill.steps.len() {
                ctx.status = ExecutionStatus::Completed;
            }
            ctx.touch();
            return Ok(StepOutcome::Executed(record));
        }

        let rollback = self.resolve_rollback(skill, &self.scope(ctx));
        self.fail_context(
            ctx,
            format!("step '{}' failed: {}", step.id, last_error),
            rollback,
        );
        Ok(StepOutcome::Terminal {
            status: ExecutionStatus::Failed,
            reason: ctx.failure_reason.clone(),
            rollback_command: ctx.rollback_command.clone(),
        })
    }

    /// Outcome for `advance` on a terminal context: replay the record at the
    /// cursor (or the last recorded step, once completed).
    fn replay_outcome(&self, ctx: &ExecutionContext, skill: &Skill) -> StepOutcome {
        let at_cursor = skill
            .steps
            .get(ctx.current_step_index)
            .and_then(|step| ctx.steps.get(&step.id));
        let record = at_cursor.or_else(|| {
            skill
                .steps
                .iter()
                .rev()
                .find_map(|step| ctx.steps.get(&step.id))
        });

        match record {
            Some(record) => StepOutcome::Replayed(record.clone()),
            None => StepOutcome::Terminal {
                status: ctx.status,
                reason: ctx.failure_reason.clone(),
                rollback_command: ctx.rollback_command.clone(),
            },
        }
    }
}

/// Retry delay for the given backoff mode and 1-based attempt number.
///
/// Constant: base; linear: base * attempt; exponential: base * 2^(attempt-1).
fn backoff_delay(mode: BackoffMode, base_ms: u64, attempt: u32) -> Duration {
    let ms = match mode {
        BackoffMode::Constant => base_ms,
        BackoffMode::Linear => base_ms.saturating_mul(attempt as u64),
        BackoffMode::Exponential => base_ms.saturating_mul(1u64 << (attempt - 1).min(20)),
    };
    Duration::from_millis(ms)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
