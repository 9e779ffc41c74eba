//! Skill registry for managing remediation skill definitions.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tracing::{error, info};

use super::builtins;
use super::types::{Skill, SkillSummary};

/// Registry for skill definitions.
///
/// Thread-safe storage for declarative skills. Created empty and populated
/// by an explicit `load_builtins` call (or `register` for externally
/// authored skills) at construction time, rather than through ambient
/// process-wide state.
pub struct SkillRegistry {
    skills: RwLock<HashMap<String, Skill>>,
}

impl SkillRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            skills: RwLock::new(HashMap::new()),
        }
    }

    /// Register a skill.
    ///
    /// # Errors
    /// Returns error if the skill is structurally invalid or a skill with the
    /// same ID already exists.
    pub fn register(&self, skill: Skill) -> Result<(), String> {
        if skill.id.is_empty() {
            return Err("Skill ID is required".to_string());
        }
        if skill.name.is_empty() {
            return Err("Skill name is required".to_string());
        }
        if skill.steps.is_empty() {
            return Err("Skill must have at least one step".to_string());
        }

        let mut seen = HashSet::new();
        for step in &skill.steps {
            if step.id.is_empty() {
                return Err(format!("Skill '{}' has a step with an empty ID", skill.id));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(format!(
                    "Skill '{}' has a duplicate step ID: {}",
                    skill.id, step.id
                ));
            }
        }

        let mut skills = self.skills.write().unwrap_or_else(|e| e.into_inner());
        if skills.contains_key(&skill.id) {
            return Err(format!("Skill '{}' already exists", skill.id));
        }

        skills.insert(skill.id.clone(), skill);
        Ok(())
    }

    /// Get a skill by ID.
    pub fn get(&self, id: &str) -> Option<Skill> {
        self.skills
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// List all skills as summaries, sorted by ID.
    pub fn list(&self) -> Vec<SkillSummary> {
        let mut summaries: Vec<_> = self
            .skills
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|s| s.to_summary())
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Get the number of registered skills.
    pub fn count(&self) -> usize {
        self.skills
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Load the built-in skill catalog, returning how many were registered.
    pub fn load_builtins(&self) -> usize {
        let skills = [
            ("scale-service", builtins::scale_service_skill()),
            ("restart-service", builtins::restart_service_skill()),
            ("clear-cache", builtins::clear_cache_skill()),
        ];

        let mut loaded = 0;
        for (name, skill) in skills {
            match self.register(skill) {
                Ok(()) => loaded += 1,
                Err(e) => {
                    error!(
                        skill = name,
                        error = %e,
                        "Failed to register builtin skill - this indicates a programming error"
                    );
                }
            }
        }

        info!(loaded, "Builtin skills loaded");
        loaded
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}
