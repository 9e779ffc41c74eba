use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Hypothesis error: {0}")]
    Hypothesis(#[from] HypothesisError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Hypothesis tree engine errors.
///
/// All mutations validate before committing; a returned error means the tree
/// is unchanged.
#[derive(Debug, Error)]
pub enum HypothesisError {
    #[error("Maximum hypothesis depth exceeded: {depth} > {max_depth}")]
    DepthExceeded { depth: u32, max_depth: u32 },

    #[error("Invalid transition for hypothesis {hypothesis_id}: {reason}")]
    InvalidTransition {
        hypothesis_id: String,
        reason: String,
    },

    #[error(
        "Ambiguous confirmation: {hypothesis_id} conflicts with already-confirmed {confirmed_id}"
    )]
    AmbiguousConfirmation {
        hypothesis_id: String,
        confirmed_id: String,
    },

    #[error("Hypothesis not found: {hypothesis_id}")]
    NotFound { hypothesis_id: String },
}

/// Step-execution state machine errors.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Skill not found: {skill_id}")]
    SkillNotFound { skill_id: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Missing required parameter: {name}")]
    MissingParameter { name: String },

    #[error("Parameter type mismatch for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Template resolution failed: {0}")]
    Template(#[from] TemplateError),

    #[error("Approval already pending for session {session_id}")]
    ApprovalAlreadyPending { session_id: String },

    #[error("Approval not found: {approval_id}")]
    ApprovalNotFound { approval_id: String },

    #[error("Approval already resolved: {approval_id} ({state})")]
    AlreadyResolved { approval_id: String, state: String },

    #[error("Step {step_id} timed out after {timeout_ms}ms")]
    StepTimeout { step_id: String, timeout_ms: u64 },

    #[error("Skill {skill_id} timed out after {timeout_ms}ms of step execution")]
    SkillTimeout { skill_id: String, timeout_ms: u64 },

    #[error("Operation '{operation}' is not valid while session {session_id} is {status}")]
    InvalidState {
        session_id: String,
        status: String,
        operation: String,
    },
}

/// Template and condition evaluation errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Unresolved variable: {name}")]
    UnresolvedVariable { name: String },

    #[error("Expression parse error: {message}")]
    Parse { message: String },

    #[error("Type error in expression: {message}")]
    Type { message: String },

    #[error("Condition did not evaluate to a boolean: {expression}")]
    NotBoolean { expression: String },
}

/// Checkpoint store errors.
///
/// A missing checkpoint is not an error; lookups return `Option`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Snapshot serialization failed: {message}")]
    Serialization { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for hypothesis tree operations
pub type HypothesisResult<T> = Result<T, HypothesisError>;

/// Result type alias for skill execution operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_hypothesis_error_display() {
        let err = HypothesisError::DepthExceeded {
            depth: 5,
            max_depth: 4,
        };
        assert_eq!(err.to_string(), "Maximum hypothesis depth exceeded: 5 > 4");

        let err = HypothesisError::InvalidTransition {
            hypothesis_id: "hyp-123".to_string(),
            reason: "already pruned".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition for hypothesis hyp-123: already pruned"
        );

        let err = HypothesisError::NotFound {
            hypothesis_id: "hyp-404".to_string(),
        };
        assert_eq!(err.to_string(), "Hypothesis not found: hyp-404");
    }

    #[test]
    fn test_ambiguous_confirmation_display() {
        let err = HypothesisError::AmbiguousConfirmation {
            hypothesis_id: "hyp-a".to_string(),
            confirmed_id: "hyp-b".to_string(),
        };
        assert!(err.to_string().contains("hyp-a"));
        assert!(err.to_string().contains("hyp-b"));
    }

    #[test]
    fn test_execution_error_display() {
        let err = ExecutionError::MissingParameter {
            name: "service".to_string(),
        };
        assert_eq!(err.to_string(), "Missing required parameter: service");

        let err = ExecutionError::TypeMismatch {
            name: "target_count".to_string(),
            expected: "number".to_string(),
            actual: "string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Parameter type mismatch for 'target_count': expected number, got string"
        );

        let err = ExecutionError::StepTimeout {
            step_id: "scale".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(err.to_string(), "Step scale timed out after 5000ms");
    }

    #[test]
    fn test_approval_error_display() {
        let err = ExecutionError::ApprovalAlreadyPending {
            session_id: "sess-1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Approval already pending for session sess-1"
        );

        let err = ExecutionError::AlreadyResolved {
            approval_id: "appr-1".to_string(),
            state: "approved".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Approval already resolved: appr-1 (approved)"
        );
    }

    #[test]
    fn test_template_error_display() {
        let err = TemplateError::UnresolvedVariable {
            name: "steps.check.result".to_string(),
        };
        assert_eq!(err.to_string(), "Unresolved variable: steps.check.result");

        let err = TemplateError::Parse {
            message: "unexpected token".to_string(),
        };
        assert_eq!(err.to_string(), "Expression parse error: unexpected token");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Database connection failed: failed to connect"
        );

        let err = StorageError::Query {
            message: "syntax error".to_string(),
        };
        assert_eq!(err.to_string(), "Query failed: syntax error");
    }

    #[test]
    fn test_hypothesis_error_conversion_to_app_error() {
        let hyp_err = HypothesisError::NotFound {
            hypothesis_id: "h-1".to_string(),
        };
        let app_err: AppError = hyp_err.into();
        assert!(matches!(app_err, AppError::Hypothesis(_)));
    }

    #[test]
    fn test_execution_error_conversion_to_app_error() {
        let exec_err = ExecutionError::SkillNotFound {
            skill_id: "scale-service".to_string(),
        };
        let app_err: AppError = exec_err.into();
        assert!(matches!(app_err, AppError::Execution(_)));
    }

    #[test]
    fn test_template_error_conversion_to_execution_error() {
        let tmpl_err = TemplateError::UnresolvedVariable {
            name: "missing".to_string(),
        };
        let exec_err: ExecutionError = tmpl_err.into();
        assert!(matches!(exec_err, ExecutionError::Template(_)));
        assert!(exec_err.to_string().contains("missing"));
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::Query {
            message: "bad".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }
}
