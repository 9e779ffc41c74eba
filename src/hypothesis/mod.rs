//! Hypothesis tree engine for root-cause investigation.
//!
//! This module owns the branching belief state of an investigation:
//! - `Hypothesis`: a candidate root-cause explanation with an evidence ledger
//! - `HypothesisTree`: arena-backed tree with propose / evidence / branch /
//!   prune / confirm operations and deterministic confidence scoring

mod engine;

pub use engine::HypothesisTree;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Taxonomy of hypothesis categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisCategory {
    /// Compute, network, or platform-level causes.
    #[default]
    Infrastructure,
    /// Bugs or regressions in the application itself.
    Application,
    /// Misconfiguration, bad deploys of config, feature flags.
    Configuration,
    /// Failures in upstream or downstream dependencies.
    Dependency,
    /// Causes outside the system (providers, traffic anomalies).
    External,
}

impl std::fmt::Display for HypothesisCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HypothesisCategory::Infrastructure => write!(f, "infrastructure"),
            HypothesisCategory::Application => write!(f, "application"),
            HypothesisCategory::Configuration => write!(f, "configuration"),
            HypothesisCategory::Dependency => write!(f, "dependency"),
            HypothesisCategory::External => write!(f, "external"),
        }
    }
}

impl std::str::FromStr for HypothesisCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "infrastructure" => Ok(HypothesisCategory::Infrastructure),
            "application" => Ok(HypothesisCategory::Application),
            "configuration" => Ok(HypothesisCategory::Configuration),
            "dependency" => Ok(HypothesisCategory::Dependency),
            "external" => Ok(HypothesisCategory::External),
            _ => Err(format!("Unknown hypothesis category: {}", s)),
        }
    }
}

/// Lifecycle status of a hypothesis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    /// Proposed, no evidence recorded yet.
    #[default]
    Pending,
    /// Evidence gathering in progress.
    Investigating,
    /// Confirmed as the root cause; state frozen.
    Confirmed,
    /// Ruled out; kept as a tombstone for audit.
    Pruned,
}

impl std::fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HypothesisStatus::Pending => write!(f, "pending"),
            HypothesisStatus::Investigating => write!(f, "investigating"),
            HypothesisStatus::Confirmed => write!(f, "confirmed"),
            HypothesisStatus::Pruned => write!(f, "pruned"),
        }
    }
}

impl std::str::FromStr for HypothesisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(HypothesisStatus::Pending),
            "investigating" => Ok(HypothesisStatus::Investigating),
            "confirmed" => Ok(HypothesisStatus::Confirmed),
            "pruned" => Ok(HypothesisStatus::Pruned),
            _ => Err(format!("Unknown hypothesis status: {}", s)),
        }
    }
}

/// Qualitative classification of how decisively evidence supports a
/// hypothesis. Ordered: `None < Weak < Strong`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStrength {
    /// Evidence does not support the hypothesis (counts as refuting).
    #[default]
    None,
    /// Evidence is consistent with the hypothesis but not decisive.
    Weak,
    /// Evidence decisively supports the hypothesis.
    Strong,
}

impl std::fmt::Display for EvidenceStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceStrength::None => write!(f, "none"),
            EvidenceStrength::Weak => write!(f, "weak"),
            EvidenceStrength::Strong => write!(f, "strong"),
        }
    }
}

impl std::str::FromStr for EvidenceStrength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(EvidenceStrength::None),
            "weak" => Ok(EvidenceStrength::Weak),
            "strong" => Ok(EvidenceStrength::Strong),
            _ => Err(format!("Unknown evidence strength: {}", s)),
        }
    }
}

/// One evidence-gathering action and its raw result, appended to a
/// hypothesis's ledger. Never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceQuery {
    /// Unique query identifier.
    pub id: String,
    /// What was asked (e.g. "db.connections: SELECT count(*) ...").
    pub query: String,
    /// Raw result payload, kept for audit.
    pub result: serde_json::Value,
    /// Classification of the result against the hypothesis.
    pub classification: EvidenceStrength,
    /// Why the result was classified this way.
    pub reasoning: String,
    /// Testing pass this evidence belongs to (bumped by re-test).
    pub pass: u32,
    /// When the evidence was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// A candidate root-cause explanation tracked by the investigation.
///
/// Parent/child links are stored as ids into the tree's arena, never as live
/// references, so the tree cannot form cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Unique hypothesis identifier.
    pub id: String,
    /// Parent hypothesis id; `None` for roots.
    pub parent_id: Option<String>,
    /// Human-readable claim (e.g. "Database connection exhaustion").
    pub statement: String,
    /// Category from the fixed taxonomy.
    pub category: HypothesisCategory,
    /// Lifecycle status.
    pub status: HypothesisStatus,
    /// Strongest evidence classification seen in the current testing pass.
    pub evidence_strength: EvidenceStrength,
    /// Confidence score 0-100; meaningful once evidence is attached, frozen
    /// once confirmed or pruned.
    pub confidence: u8,
    /// Free-text justification, append-only.
    pub reasoning: String,
    /// Supporting evidence notes, append-only.
    pub confirming_evidence: Vec<String>,
    /// Refuting evidence notes, append-only.
    pub refuting_evidence: Vec<String>,
    /// Evidence ledger: ordered queries with raw results, audit-only.
    pub queries: Vec<EvidenceQuery>,
    /// Child hypothesis ids, in creation order.
    pub children: Vec<String>,
    /// Depth in the tree; 0 for roots.
    pub depth: u32,
    /// Current testing pass; evidence ratchet applies within one pass.
    pub test_pass: u32,
    /// Reason recorded when the hypothesis reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    /// When the hypothesis was proposed.
    pub created_at: DateTime<Utc>,
    /// When the hypothesis was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Hypothesis {
    /// Create a new root-level hypothesis in `Pending` status
    pub fn new(statement: impl Into<String>, category: HypothesisCategory) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            statement: statement.into(),
            category,
            status: HypothesisStatus::Pending,
            evidence_strength: EvidenceStrength::None,
            confidence: 0,
            reasoning: String::new(),
            confirming_evidence: Vec::new(),
            refuting_evidence: Vec::new(),
            queries: Vec::new(),
            children: Vec::new(),
            depth: 0,
            test_pass: 1,
            status_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the parent and depth (parent's depth + 1)
    pub fn with_parent(mut self, parent_id: impl Into<String>, parent_depth: u32) -> Self {
        self.parent_id = Some(parent_id.into());
        self.depth = parent_depth + 1;
        self
    }

    /// Set the initial reasoning
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Whether the hypothesis is in a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            HypothesisStatus::Confirmed | HypothesisStatus::Pruned
        )
    }

    /// Evidence records belonging to the current testing pass
    pub fn current_pass_evidence(&self) -> Vec<&EvidenceQuery> {
        self.queries
            .iter()
            .filter(|q| q.pass == self.test_pass)
            .collect()
    }
}

impl EvidenceQuery {
    /// Create a new evidence record for the given testing pass
    pub fn new(
        query: impl Into<String>,
        result: serde_json::Value,
        classification: EvidenceStrength,
        reasoning: impl Into<String>,
        pass: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.into(),
            result,
            classification,
            reasoning: reasoning.into(),
            pass,
            recorded_at: Utc::now(),
        }
    }
}
