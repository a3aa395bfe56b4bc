use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::{AgentType, TrustLevel};

/// A calling principal known to the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Server-assigned row id.
    pub id: Uuid,
    /// Globally unique external identifier, e.g. "athena-conductor".
    pub agent_id: String,
    pub display_name: String,
    pub agent_type: AgentType,
    /// Tenancy boundary for `team` memories.
    pub namespace: String,
    /// Dynamic capabilities and features.
    #[serde(default)]
    pub capabilities: BTreeMap<String, Value>,
    /// Agent-specific configuration.
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    pub access_level: TrustLevel,
    pub is_active: bool,
    /// Memories owned by this agent, maintained by the service.
    #[serde(default)]
    pub memory_count: i64,
    pub last_activity: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(agent_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            display_name: display_name.into(),
            agent_type: AgentType::CustomAgent,
            namespace: "default".to_string(),
            capabilities: BTreeMap::new(),
            config: BTreeMap::new(),
            access_level: TrustLevel::Standard,
            is_active: true,
            memory_count: 0,
            last_activity: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_access_level(mut self, level: TrustLevel) -> Self {
        self.access_level = level;
        self
    }

    pub fn with_agent_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = agent_type;
        self
    }

    pub fn with_capability(mut self, name: impl Into<String>, value: Value) -> Self {
        self.capabilities.insert(name.into(), value);
        self
    }

    pub fn touch(&mut self) {
        self.last_activity = Some(Utc::now());
    }
}
