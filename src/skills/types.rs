//! Data types for declarative remediation skills.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A declarative, parameterized, multi-step remediation workflow.
///
/// Skills are externally authored and read-only to the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Unique skill identifier (e.g. "scale-service").
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description of what the skill does.
    pub description: String,
    /// Parameter schema keyed by parameter name.
    pub params: HashMap<String, ParamSpec>,
    /// Ordered steps; step ids are unique within a skill.
    pub steps: Vec<SkillStep>,
    /// Operational risk classification.
    pub risk_level: RiskLevel,
    /// Command template to undo the skill's effects, resolved against the
    /// execution context when surfaced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<String>,
    /// Bound on the sum of all step execution times.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// A single step in a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillStep {
    /// Unique step identifier within the skill.
    pub id: String,
    /// Name of the externally-dispatched operation.
    pub action: String,
    /// Parameter template expressions.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Boolean template expression; when false the step is skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Whether the step suspends at the approval gate before dispatch.
    #[serde(default)]
    pub requires_approval: bool,
    /// Error policy when dispatch fails.
    #[serde(default)]
    pub on_error: OnErrorPolicy,
    /// Number of retries when `on_error` is `Retry`.
    #[serde(default)]
    pub retry_count: u32,
    /// Base delay between retries in milliseconds.
    #[serde(default)]
    pub retry_delay_ms: u64,
    /// How the retry delay grows per attempt.
    #[serde(default)]
    pub retry_backoff: BackoffMode,
    /// Bound on this step's dispatch time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Operational risk classification of a skill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Read-only or trivially reversible.
    #[default]
    Low,
    /// Reversible with minor impact.
    Medium,
    /// Disruptive; requires care.
    High,
    /// Potentially destructive or customer-visible.
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

/// Step error policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnErrorPolicy {
    /// Fail the skill, retaining partial results (default).
    #[default]
    Abort,
    /// Record the error and continue with the next step.
    Continue,
    /// Re-attempt the step with backoff before giving up.
    Retry,
}

impl std::fmt::Display for OnErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnErrorPolicy::Abort => write!(f, "abort"),
            OnErrorPolicy::Continue => write!(f, "continue"),
            OnErrorPolicy::Retry => write!(f, "retry"),
        }
    }
}

impl std::str::FromStr for OnErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(OnErrorPolicy::Abort),
            "continue" => Ok(OnErrorPolicy::Continue),
            "retry" => Ok(OnErrorPolicy::Retry),
            _ => Err(format!("Unknown error policy: {}", s)),
        }
    }
}

/// Retry delay growth mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffMode {
    /// Same delay every attempt.
    #[default]
    Constant,
    /// Delay multiplied by the attempt number.
    Linear,
    /// Delay doubled each attempt.
    Exponential,
}

impl std::fmt::Display for BackoffMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffMode::Constant => write!(f, "constant"),
            BackoffMode::Linear => write!(f, "linear"),
            BackoffMode::Exponential => write!(f, "exponential"),
        }
    }
}

impl std::str::FromStr for BackoffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "constant" => Ok(BackoffMode::Constant),
            "linear" => Ok(BackoffMode::Linear),
            "exponential" => Ok(BackoffMode::Exponential),
            _ => Err(format!("Unknown backoff mode: {}", s)),
        }
    }
}

/// Parameter specification for skill inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Expected JSON type.
    pub param_type: ParamType,
    /// Whether the parameter is required.
    pub required: bool,
    /// Default value applied when the parameter is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Description of the parameter.
    pub description: String,
}

/// Expected JSON type of a skill parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// JSON string.
    String,
    /// JSON number (integer or float).
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ParamType {
    /// Whether the JSON value matches this type
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamType::String => write!(f, "string"),
            ParamType::Number => write!(f, "number"),
            ParamType::Boolean => write!(f, "boolean"),
            ParamType::Array => write!(f, "array"),
            ParamType::Object => write!(f, "object"),
        }
    }
}

/// Brief skill summary for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSummary {
    /// Skill identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// Number of steps.
    pub step_count: usize,
    /// Whether any step requires approval.
    pub requires_approval: bool,
}

impl Skill {
    /// Create a summary from the full skill.
    pub fn to_summary(&self) -> SkillSummary {
        SkillSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            risk_level: self.risk_level,
            step_count: self.steps.len(),
            requires_approval: self.steps.iter().any(|s| s.requires_approval),
        }
    }
}

impl SkillStep {
    /// Create a new step with the given id and action.
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            parameters: HashMap::new(),
            condition: None,
            requires_approval: false,
            on_error: OnErrorPolicy::Abort,
            retry_count: 0,
            retry_delay_ms: 0,
            retry_backoff: BackoffMode::Constant,
            timeout_ms: None,
        }
    }

    /// Add a parameter template.
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Set the condition expression.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Require approval before dispatch.
    pub fn requires_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Set the error policy.
    pub fn on_error(mut self, policy: OnErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// Configure retries (implies `OnErrorPolicy::Retry`).
    pub fn with_retries(mut self, count: u32, delay_ms: u64, backoff: BackoffMode) -> Self {
        self.on_error = OnErrorPolicy::Retry;
        self.retry_count = count;
        self.retry_delay_ms = delay_ms;
        self.retry_backoff = backoff;
        self
    }

    /// Set the step timeout.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_skill_to_summary() {
        let skill = Skill {
            id: "test".to_string(),
            name: "Test Skill".to_string(),
            description: "A test skill".to_string(),
            params: HashMap::new(),
            steps: vec![
                SkillStep::new("step1", "noop"),
                SkillStep::new("step2", "noop").requires_approval(),
            ],
            risk_level: RiskLevel::High,
            rollback: None,
            timeout_ms: None,
        };

        let summary = skill.to_summary();
        assert_eq!(summary.id, "test");
        assert_eq!(summary.step_count, 2);
        assert_eq!(summary.risk_level, RiskLevel::High);
        assert!(summary.requires_approval);
    }

    #[test]
    fn test_step_builder() {
        let step = SkillStep::new("scale", "kubernetes.scale")
            .with_param("service", json!("{{ service }}"))
            .with_condition("{{ current_count < target_count }}")
            .requires_approval()
            .with_retries(3, 5000, BackoffMode::Exponential)
            .with_timeout(30_000);

        assert_eq!(step.id, "scale");
        assert_eq!(step.action, "kubernetes.scale");
        assert_eq!(step.parameters.get("service"), Some(&json!("{{ service }}")));
        assert!(step.condition.is_some());
        assert!(step.requires_approval);
        assert_eq!(step.on_error, OnErrorPolicy::Retry);
        assert_eq!(step.retry_count, 3);
        assert_eq!(step.retry_delay_ms, 5000);
        assert_eq!(step.retry_backoff, BackoffMode::Exponential);
        assert_eq!(step.timeout_ms, Some(30_000));
    }

    #[test]
    fn test_risk_level_roundtrip() {
        for level in [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ] {
            let parsed: RiskLevel = level.to_string().parse().unwrap();
            assert_eq!(parsed, level);
        }
        assert!(RiskLevel::Critical > RiskLevel::Low);
    }

    #[test]
    fn test_on_error_policy_default_is_abort() {
        assert_eq!(OnErrorPolicy::default(), OnErrorPolicy::Abort);
        let step = SkillStep::new("s", "a");
        assert_eq!(step.on_error, OnErrorPolicy::Abort);
    }

    #[test]
    fn test_backoff_mode_roundtrip() {
        for mode in [
            BackoffMode::Constant,
            BackoffMode::Linear,
            BackoffMode::Exponential,
        ] {
            let parsed: BackoffMode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_param_type_matches() {
        assert!(ParamType::String.matches(&json!("x")));
        assert!(ParamType::Number.matches(&json!(3)));
        assert!(ParamType::Number.matches(&json!(3.5)));
        assert!(ParamType::Boolean.matches(&json!(true)));
        assert!(ParamType::Array.matches(&json!([1])));
        assert!(ParamType::Object.matches(&json!({"a": 1})));
        assert!(!ParamType::Number.matches(&json!("3")));
        assert!(!ParamType::String.matches(&json!(null)));
    }

    #[test]
    fn test_step_deserialize_minimal() {
        let json = r#"{"id": "s1", "action": "noop"}"#;
        let step: SkillStep = serde_json::from_str(json).unwrap();
        assert_eq!(step.id, "s1");
        assert!(step.parameters.is_empty());
        assert!(!step.requires_approval);
        assert_eq!(step.on_error, OnErrorPolicy::Abort);
        assert_eq!(step.retry_backoff, BackoffMode::Constant);
    }

    #[test]
    fn test_skill_serde_roundtrip() {
        let skill = Skill {
            id: "restart".to_string(),
            name: "Restart".to_string(),
            description: "restart a service".to_string(),
            params: HashMap::from([(
                "service".to_string(),
                ParamSpec {
                    param_type: ParamType::String,
                    required: true,
                    default: None,
                    description: "service name".to_string(),
                },
            )]),
            steps: vec![SkillStep::new("restart", "systemd.restart")],
            risk_level: RiskLevel::Medium,
            rollback: Some("systemd.start --service {{ service }}".to_string()),
            timeout_ms: Some(120_000),
        };

        let json = serde_json::to_string(&skill).unwrap();
        let parsed: Skill = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, skill.id);
        assert_eq!(parsed.steps.len(), 1);
        assert_eq!(parsed.rollback, skill.rollback);
        assert!(parsed.params.get("service").unwrap().required);
    }
}
