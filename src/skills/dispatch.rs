//! Action dispatch seam between the step executor and external tools.
//!
//! The executor never interprets action names itself; it hands them to a
//! `ToolDispatcher`. The provided `HandlerDispatcher` resolves names against
//! a handler map registered once at startup, with a typed error for
//! unregistered names.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by action dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered for the action name.
    #[error("Unknown action: {action}")]
    UnknownAction {
        /// The unregistered action name.
        action: String,
    },

    /// The handler ran and reported a failure.
    #[error("Action '{action}' failed: {message}")]
    Failed {
        /// The action that failed.
        action: String,
        /// Failure detail from the handler.
        message: String,
    },
}

/// External tool collaborator invoked by the step executor.
///
/// Implementations must return within the step's timeout or the dispatch is
/// treated as a timeout failure.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Execute `action` with fully resolved parameters.
    async fn execute(&self, action: &str, params: &Value) -> Result<Value, DispatchError>;
}

/// Handler signature for `HandlerDispatcher`.
pub type ActionHandler = Box<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// Dispatcher backed by a handler map resolved once at startup.
#[derive(Default)]
pub struct HandlerDispatcher {
    handlers: HashMap<String, ActionHandler>,
}

impl HandlerDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for an action name, replacing any existing one
    pub fn register<F>(&mut self, action: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(action.into(), Box::new(handler));
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl ToolDispatcher for HandlerDispatcher {
    async fn execute(&self, action: &str, params: &Value) -> Result<Value, DispatchError> {
        let handler = self
            .handlers
            .get(action)
            .ok_or_else(|| DispatchError::UnknownAction {
                action: action.to_string(),
            })?;
        handler(params).map_err(|message| DispatchError::Failed {
            action: action.to_string(),
            message,
        })
    }
}
