//! Built-in remediation skills for common operational incidents.

use std::collections::HashMap;

use serde_json::json;

use super::types::{BackoffMode, OnErrorPolicy, ParamSpec, ParamType, RiskLevel, Skill, SkillStep};

/// Scale a service to a target replica count.
///
/// Steps:
/// 1. Capacity check - confirm the cluster can absorb the new replicas
/// 2. Scale - gated on approval, skipped when already at or above target
/// 3. Verify - poll replica readiness with exponential backoff
pub fn scale_service_skill() -> Skill {
    Skill {
        id: "scale-service".to_string(),
        name: "Scale Service".to_string(),
        description: "Scale a service to a target replica count with capacity check and readiness verification"
            .to_string(),
        params: HashMap::from([
            (
                "service".to_string(),
                ParamSpec {
                    param_type: ParamType::String,
                    required: true,
                    default: None,
                    description: "Service to scale".to_string(),
                },
            ),
            (
                "target_count".to_string(),
                ParamSpec {
                    param_type: ParamType::Number,
                    required: true,
                    default: None,
                    description: "Desired replica count".to_string(),
                },
            ),
            (
                "current_count".to_string(),
                ParamSpec {
                    param_type: ParamType::Number,
                    required: true,
                    default: None,
                    description: "Current replica count, used for rollback".to_string(),
                },
            ),
        ]),
        steps: vec![
            SkillStep::new("capacity_check", "metrics.cluster_capacity")
                .with_param("service", json!("{{ service }}"))
                .with_param("additional_replicas", json!("{{ target_count }}")),
            SkillStep::new("scale", "kubernetes.scale")
                .with_param("service", json!("{{ service }}"))
                .with_param("replicas", json!("{{ target_count }}"))
                .with_condition("{{ current_count < target_count }}")
                .requires_approval(),
            SkillStep::new("verify", "kubernetes.ready_replicas")
                .with_param("service", json!("{{ service }}"))
                .with_retries(3, 5000, BackoffMode::Exponential)
                .with_timeout(15_000),
        ],
        risk_level: RiskLevel::High,
        rollback: Some(
            "kubernetes.scale --service {{ service }} --replicas {{ current_count }}".to_string(),
        ),
        timeout_ms: Some(300_000),
    }
}

/// Restart a service behind a load balancer.
///
/// Steps:
/// 1. Drain - remove the instance from rotation
/// 2. Restart - gated on approval
/// 3. Health check - retried until the service reports healthy
pub fn restart_service_skill() -> Skill {
    Skill {
        id: "restart-service".to_string(),
        name: "Restart Service".to_string(),
        description: "Drain, restart, and health-check a service".to_string(),
        params: HashMap::from([(
            "service".to_string(),
            ParamSpec {
                param_type: ParamType::String,
                required: true,
                default: None,
                description: "Service to restart".to_string(),
            },
        )]),
        steps: vec![
            SkillStep::new("drain", "loadbalancer.drain")
                .with_param("service", json!("{{ service }}"))
                .with_timeout(60_000),
            SkillStep::new("restart", "systemd.restart")
                .with_param("service", json!("{{ service }}"))
                .requires_approval(),
            SkillStep::new("health_check", "http.health_check")
                .with_param("service", json!("{{ service }}"))
                .with_retries(5, 2000, BackoffMode::Linear)
                .with_timeout(10_000),
        ],
        risk_level: RiskLevel::Medium,
        rollback: Some("loadbalancer.restore --service {{ service }}".to_string()),
        timeout_ms: Some(180_000),
    }
}

/// Flush an application cache namespace.
///
/// Low risk: no approval gate; cache misses repopulate on their own, so the
/// only consequence of a mistake is a brief latency bump.
pub fn clear_cache_skill() -> Skill {
    Skill {
        id: "clear-cache".to_string(),
        name: "Clear Cache".to_string(),
        description: "Flush a cache namespace and warm it with a probe request".to_string(),
        params: HashMap::from([
            (
                "namespace".to_string(),
                ParamSpec {
                    param_type: ParamType::String,
                    required: true,
                    default: None,
                    description: "Cache namespace to flush".to_string(),
                },
            ),
            (
                "warm".to_string(),
                ParamSpec {
                    param_type: ParamType::Boolean,
                    required: false,
                    default: Some(json!(true)),
                    description: "Whether to issue a warming probe after the flush".to_string(),
                },
            ),
        ]),
        steps: vec![
            SkillStep::new("flush", "cache.flush")
                .with_param("namespace", json!("{{ namespace }}")),
            SkillStep::new("warm", "cache.warm")
                .with_param("namespace", json!("{{ namespace }}"))
                .with_condition("{{ warm == true }}")
                .on_error(OnErrorPolicy::Continue),
        ],
        risk_level: RiskLevel::Low,
        rollback: None,
        timeout_ms: Some(60_000),
    }
}
