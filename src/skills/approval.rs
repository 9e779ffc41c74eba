//! Approval gate: suspension of a step pending an external decision.
//!
//! An approval request is durable state on the execution context, not a live
//! timer; expiry is checked whenever the gate is consulted, so a process
//! restart while awaiting approval loses nothing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::RiskLevel;

/// Resolution state of an approval request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// Awaiting an external decision.
    #[default]
    Pending,
    /// Explicitly approved; the gated step proceeds to dispatch.
    Approved,
    /// Explicitly denied; the skill fails.
    Denied,
    /// Expired unresolved; equivalent to denied but recorded distinctly.
    Timeout,
}

impl std::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalState::Pending => write!(f, "pending"),
            ApprovalState::Approved => write!(f, "approved"),
            ApprovalState::Denied => write!(f, "denied"),
            ApprovalState::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::str::FromStr for ApprovalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ApprovalState::Pending),
            "approved" => Ok(ApprovalState::Approved),
            "denied" => Ok(ApprovalState::Denied),
            "timeout" => Ok(ApprovalState::Timeout),
            _ => Err(format!("Unknown approval state: {}", s)),
        }
    }
}

/// An external decision on a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Allow the gated step to proceed.
    Approved,
    /// Refuse the gated step; the skill fails.
    Denied,
}

/// A request for human approval of a gated step.
///
/// Resolved exactly once by one of approve, deny, or timeout; immutable
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique approval identifier.
    pub id: String,
    /// Session (execution context) the request belongs to.
    pub session_id: String,
    /// Skill being executed.
    pub skill_id: String,
    /// The gated step.
    pub step_id: String,
    /// Action that will be dispatched if approved.
    pub action: String,
    /// Fully resolved parameters the action will receive.
    pub parameters: serde_json::Value,
    /// Risk classification of the skill.
    pub risk_level: RiskLevel,
    /// Rollback command resolved against the current context, if declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_command: Option<String>,
    /// Resolution state.
    pub state: ApprovalState,
    /// When the request was issued.
    pub requested_at: DateTime<Utc>,
    /// When the request was resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Identity of the approver, when explicitly resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    /// How long the request stays pending before timing out.
    pub timeout_ms: u64,
}

impl ApprovalRequest {
    /// Create a new pending approval request
    pub fn new(
        session_id: impl Into<String>,
        skill_id: impl Into<String>,
        step_id: impl Into<String>,
        action: impl Into<String>,
        parameters: serde_json::Value,
        risk_level: RiskLevel,
        timeout_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            skill_id: skill_id.into(),
            step_id: step_id.into(),
            action: action.into(),
            parameters,
            risk_level,
            rollback_command: None,
            state: ApprovalState::Pending,
            requested_at: Utc::now(),
            resolved_at: None,
            approver: None,
            timeout_ms: timeout_ms.max(1),
        }
    }

    /// Attach the resolved rollback command
    pub fn with_rollback(mut self, rollback_command: Option<String>) -> Self {
        self.rollback_command = rollback_command;
        self
    }

    /// Whether the request is still awaiting a decision
    pub fn is_pending(&self) -> bool {
        self.state == ApprovalState::Pending
    }

    /// Whether the pending window has elapsed as of `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_pending()
            && now - self.requested_at >= Duration::milliseconds(self.timeout_ms as i64)
    }

    /// Apply an explicit decision. Caller must have checked `is_pending`.
    pub fn resolve(&mut self, decision: ApprovalDecision, approver: impl Into<String>) {
        self.state = match decision {
            ApprovalDecision::Approved => ApprovalState::Approved,
            ApprovalDecision::Denied => ApprovalState::Denied,
        };
        self.approver = Some(approver.into());
        self.resolved_at = Some(Utc::now());
    }

    /// Resolve as timed out
    pub fn expire(&mut self) {
        self.state = ApprovalState::Timeout;
        self.resolved_at = Some(Utc::now());
    }
}
