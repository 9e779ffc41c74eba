//! Checkpoint store for durable investigation snapshots.
//!
//! Checkpoints are immutable value snapshots of an investigation's hypothesis
//! tree and (optionally) its in-flight skill execution, organized per
//! investigation id with a mutable "latest" pointer and oldest-first
//! retention.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::hypothesis::Hypothesis;
use crate::skills::ExecutionContext;

/// Investigation lifecycle phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationPhase {
    /// Gathering initial signals and symptoms.
    #[default]
    Triage,
    /// Proposing candidate root causes.
    Hypothesize,
    /// Testing hypotheses with evidence queries.
    Investigate,
    /// Root cause identified; wrapping up.
    Conclude,
}

impl std::fmt::Display for InvestigationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvestigationPhase::Triage => write!(f, "triage"),
            InvestigationPhase::Hypothesize => write!(f, "hypothesize"),
            InvestigationPhase::Investigate => write!(f, "investigate"),
            InvestigationPhase::Conclude => write!(f, "conclude"),
        }
    }
}

impl std::str::FromStr for InvestigationPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "triage" => Ok(InvestigationPhase::Triage),
            "hypothesize" => Ok(InvestigationPhase::Hypothesize),
            "investigate" => Ok(InvestigationPhase::Investigate),
            "conclude" => Ok(InvestigationPhase::Conclude),
            _ => Err(format!("Unknown investigation phase: {}", s)),
        }
    }
}

/// Immutable point-in-time snapshot of an investigation.
///
/// Holds value copies only; mutating the live tree or execution context after
/// a save never affects a stored checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint identifier.
    pub id: String,
    /// Investigation the checkpoint belongs to.
    pub investigation_id: String,
    /// Active skill execution session, if one is in flight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
    /// Investigation phase at snapshot time.
    pub phase: InvestigationPhase,
    /// The original natural-language request.
    pub query: String,
    /// Overall investigation confidence (0-100).
    pub confidence: u8,
    /// Flattened value snapshot of the hypothesis tree.
    pub hypotheses: Vec<Hypothesis>,
    /// Value snapshot of the in-flight execution context, if any. A paused
    /// approval survives process restarts through this field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionContext>,
    /// Number of language-model prompts issued so far.
    pub prompt_count: u32,
    /// Number of tool calls issued so far.
    pub tool_call_count: u32,
    /// Services discovered during the investigation.
    pub services: Vec<String>,
    /// Observed symptoms.
    pub symptoms: Vec<String>,
    /// Confirmed root cause, once concluded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    /// Services affected by the incident.
    pub affected_services: Vec<String>,
}

impl Checkpoint {
    /// Create a new checkpoint for an investigation
    pub fn new(
        investigation_id: impl Into<String>,
        phase: InvestigationPhase,
        query: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            investigation_id: investigation_id.into(),
            session_id: None,
            created_at: Utc::now(),
            phase,
            query: query.into(),
            confidence: 0,
            hypotheses: Vec::new(),
            execution: None,
            prompt_count: 0,
            tool_call_count: 0,
            services: Vec::new(),
            symptoms: Vec::new(),
            root_cause: None,
            affected_services: Vec::new(),
        }
    }

    /// Attach the hypothesis tree snapshot
    pub fn with_hypotheses(mut self, hypotheses: Vec<Hypothesis>) -> Self {
        self.hypotheses = hypotheses;
        self
    }

    /// Attach an execution context snapshot
    pub fn with_execution(mut self, execution: ExecutionContext) -> Self {
        self.session_id = Some(execution.session_id.clone());
        self.execution = Some(execution);
        self
    }

    /// Set the overall confidence
    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence.min(100);
        self
    }

    /// Set prompt and tool-call counts
    pub fn with_counts(mut self, prompt_count: u32, tool_call_count: u32) -> Self {
        self.prompt_count = prompt_count;
        self.tool_call_count = tool_call_count;
        self
    }

    /// Set discovered services
    pub fn with_services(mut self, services: Vec<String>) -> Self {
        self.services = services;
        self
    }

    /// Set observed symptoms
    pub fn with_symptoms(mut self, symptoms: Vec<String>) -> Self {
        self.symptoms = symptoms;
        self
    }

    /// Set the confirmed root cause and affected services
    pub fn with_root_cause(
        mut self,
        root_cause: impl Into<String>,
        affected_services: Vec<String>,
    ) -> Self {
        self.root_cause = Some(root_cause.into());
        self.affected_services = affected_services;
        self
    }

    /// Number of hypotheses in the snapshot
    pub fn hypothesis_count(&self) -> usize {
        self.hypotheses.len()
    }
}

/// Brief checkpoint summary for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointListEntry {
    /// Checkpoint identifier.
    pub id: String,
    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
    /// Investigation phase at snapshot time.
    pub phase: InvestigationPhase,
    /// Overall confidence (0-100).
    pub confidence: u8,
    /// Number of hypotheses in the snapshot.
    pub hypothesis_count: usize,
}

/// Summary of one investigation's stored checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationSummary {
    /// Investigation identifier.
    pub investigation_id: String,
    /// Number of stored checkpoints.
    pub checkpoint_count: usize,
    /// The most recent checkpoint.
    pub latest: CheckpointListEntry,
}

/// Durable checkpoint storage.
///
/// Implementations must support concurrent saves across different
/// investigations and serialize writes within one investigation: a reader
/// must never observe a "latest" pointer referencing a checkpoint that is not
/// durably written.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a checkpoint, update the investigation's "latest" pointer,
    /// and evict the oldest checkpoints beyond the retention limit.
    /// Returns the checkpoint id.
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> StorageResult<String>;

    /// Load a specific checkpoint; `None` when not found.
    async fn get_checkpoint(
        &self,
        investigation_id: &str,
        checkpoint_id: &str,
    ) -> StorageResult<Option<Checkpoint>>;

    /// Load the most recent checkpoint in O(1) via the "latest" pointer.
    async fn latest_checkpoint(&self, investigation_id: &str)
        -> StorageResult<Option<Checkpoint>>;

    /// List checkpoints for an investigation, newest first.
    async fn list_checkpoints(
        &self,
        investigation_id: &str,
    ) -> StorageResult<Vec<CheckpointListEntry>>;

    /// List all investigations with counts and their latest checkpoint.
    async fn list_investigations(&self) -> StorageResult<Vec<InvestigationSummary>>;

    /// Delete one checkpoint; returns whether it existed.
    async fn delete_checkpoint(
        &self,
        investigation_id: &str,
        checkpoint_id: &str,
    ) -> StorageResult<bool>;

    /// Delete all checkpoints for an investigation; returns how many.
    async fn delete_investigation(&self, investigation_id: &str) -> StorageResult<u64>;
}
