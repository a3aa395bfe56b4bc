//! The immutable Trinitas catalogue. Built once at startup; never
//! persisted as mutable rows and never unregisterable.

use std::sync::LazyLock;

use serde_json::json;
use tmws_core::{AgentRecord, AgentType, TrustLevel};

/// Short-name aliases for the built-in agents.
pub const ALIASES: &[(&str, &str)] = &[
    ("athena", "athena-conductor"),
    ("artemis", "artemis-optimizer"),
    ("hestia", "hestia-auditor"),
    ("eris", "eris-coordinator"),
    ("hera", "hera-strategist"),
    ("muses", "muses-documenter"),
];

/// The six built-in Trinitas agents.
pub static TRINITAS_AGENTS: LazyLock<Vec<AgentRecord>> = LazyLock::new(|| {
    vec![
        builtin(
            "athena-conductor",
            "Athena - Harmonious Conductor",
            TrustLevel::System,
            &[
                "orchestration",
                "workflow_automation",
                "parallel_execution",
                "task_delegation",
            ],
        ),
        builtin(
            "artemis-optimizer",
            "Artemis - Technical Perfectionist",
            TrustLevel::Elevated,
            &[
                "performance_optimization",
                "code_quality",
                "algorithm_design",
                "best_practices",
            ],
        ),
        builtin(
            "hestia-auditor",
            "Hestia - Security Guardian",
            TrustLevel::System,
            &[
                "security_analysis",
                "vulnerability_assessment",
                "threat_modeling",
                "audit_logging",
            ],
        ),
        builtin(
            "eris-coordinator",
            "Eris - Tactical Coordinator",
            TrustLevel::Elevated,
            &[
                "tactical_planning",
                "team_coordination",
                "conflict_resolution",
                "collaboration",
            ],
        ),
        builtin(
            "hera-strategist",
            "Hera - Strategic Commander",
            TrustLevel::Elevated,
            &[
                "strategic_planning",
                "architecture_design",
                "long_term_vision",
                "roadmap_development",
            ],
        ),
        builtin(
            "muses-documenter",
            "Muses - Knowledge Architect",
            TrustLevel::Standard,
            &[
                "documentation",
                "knowledge_management",
                "specification_writing",
                "archive_management",
            ],
        ),
    ]
});

fn builtin(
    agent_id: &str,
    display_name: &str,
    level: TrustLevel,
    capabilities: &[&str],
) -> AgentRecord {
    let mut record = AgentRecord::new(agent_id, display_name)
        .with_namespace("trinitas")
        .with_access_level(level)
        .with_agent_type(AgentType::SystemAgent);
    record
        .capabilities
        .insert("specialties".to_string(), json!(capabilities));
    record
}

/// Resolve a short alias to its full id.
pub fn alias_to_id(name: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, id)| *id)
}

/// Whether `agent_id` names a built-in (full id or alias).
pub fn is_builtin(name: &str) -> bool {
    alias_to_id(name).is_some()
        || TRINITAS_AGENTS.iter().any(|a| a.agent_id == name)
}

/// Look up a built-in record by full id.
pub fn builtin_by_id(agent_id: &str) -> Option<&'static AgentRecord> {
    TRINITAS_AGENTS.iter().find(|a| a.agent_id == agent_id)
}
