use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tmws_core::{AgentRecord, AgentType, Result, TmwsError, TrustLevel};
use tmws_storage::MemoryStore;

use crate::builtin;

/// Caller-supplied description of an agent to register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSpec {
    pub agent_id: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub agent_type: AgentType,
    pub namespace: Option<String>,
    #[serde(default)]
    pub capabilities: std::collections::BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub access_level: TrustLevel,
}

/// Filter for listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentFilter {
    pub namespace: Option<String>,
    pub agent_type: Option<AgentType>,
}

/// Registry statistics summary.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatistics {
    pub total_agents: usize,
    pub builtin_agents: usize,
    pub active_agents: usize,
    pub agent_types: HashMap<String, usize>,
}

/// Holds the immutable built-in catalogue plus dynamically registered
/// agents. Mutations go through this type only (single-writer rule); the
/// storage layer keeps the persisted copies.
pub struct AgentRegistry {
    store: MemoryStore,
    dynamic: RwLock<HashMap<String, AgentRecord>>,
}

impl AgentRegistry {
    /// Build the registry, loading persisted agents from storage.
    pub fn new(store: MemoryStore) -> Result<Self> {
        let mut dynamic = HashMap::new();
        for agent in store.list_agents(None, None, false)? {
            // Built-ins are seeded from the static table, not the database.
            if !builtin::is_builtin(&agent.agent_id) {
                dynamic.insert(agent.agent_id.clone(), agent);
            }
        }
        if !dynamic.is_empty() {
            info!(count = dynamic.len(), "loaded persisted agents");
        }
        Ok(Self {
            store,
            dynamic: RwLock::new(dynamic),
        })
    }

    /// Resolve a short alias or full id to an agent record. Aliases are
    /// tried first, then full ids. Unknown names error; switching never
    /// auto-registers.
    pub fn resolve(&self, name_or_id: &str) -> Result<AgentRecord> {
        let full_id = builtin::alias_to_id(name_or_id).unwrap_or(name_or_id);

        if let Some(agent) = builtin::builtin_by_id(full_id) {
            return Ok(agent.clone());
        }
        if let Some(agent) = self.dynamic.read().get(full_id) {
            if agent.is_active {
                return Ok(agent.clone());
            }
        }
        Err(TmwsError::UnknownAgent(name_or_id.to_string()))
    }

    /// Register a new agent. Every field is validated; clashes with
    /// built-in names (or their aliases) are `ErrNameConflict`, clashes
    /// with existing registrations `ErrDuplicateId`.
    pub fn register(&self, spec: RegisterSpec, persist: bool) -> Result<AgentRecord> {
        tmws_validate::validate_agent_id(&spec.agent_id)?;
        let namespace = spec.namespace.unwrap_or_else(|| "default".to_string());
        tmws_validate::validate_namespace(&namespace)?;

        if builtin::is_builtin(&spec.agent_id) {
            return Err(TmwsError::NameConflict(format!(
                "'{}' is a built-in agent",
                spec.agent_id
            )));
        }

        let mut dynamic = self.dynamic.write();
        if dynamic.contains_key(&spec.agent_id) {
            return Err(TmwsError::DuplicateId(spec.agent_id));
        }

        let display_name = spec
            .display_name
            .unwrap_or_else(|| spec.agent_id.clone());
        let mut record = AgentRecord::new(spec.agent_id.clone(), display_name)
            .with_namespace(namespace)
            .with_agent_type(spec.agent_type)
            .with_access_level(spec.access_level);
        record.capabilities = spec.capabilities;
        record.last_activity = Some(Utc::now());

        if persist {
            self.store.upsert_agent(&record)?;
        }
        debug!(agent = %record.agent_id, persist, "agent registered");
        dynamic.insert(record.agent_id.clone(), record.clone());
        Ok(record)
    }

    /// Unregister an agent: built-ins are refused; dynamic agents are
    /// archived but their memories stay in place.
    pub fn unregister(&self, name_or_id: &str) -> Result<()> {
        let full_id = builtin::alias_to_id(name_or_id).unwrap_or(name_or_id);
        if builtin::is_builtin(full_id) {
            return Err(TmwsError::Permission(format!(
                "built-in agent '{full_id}' cannot be unregistered"
            )));
        }

        let mut dynamic = self.dynamic.write();
        let Some(agent) = dynamic.get_mut(full_id) else {
            return Err(TmwsError::UnknownAgent(name_or_id.to_string()));
        };
        agent.is_active = false;
        agent.updated_at = Utc::now();
        // Archive the persisted copy if one exists; a session-only agent
        // has no row to archive.
        match self.store.archive_agent(full_id) {
            Ok(()) | Err(TmwsError::UnknownAgent(_)) => {}
            Err(e) => return Err(e),
        }
        info!(agent = full_id, "agent unregistered");
        Ok(())
    }

    /// All visible agents (built-ins plus active registrations), with
    /// stable ordering by agent_id ascending.
    pub fn list(&self, filter: &AgentFilter) -> Vec<AgentRecord> {
        let mut agents: Vec<AgentRecord> = builtin::TRINITAS_AGENTS.iter().cloned().collect();
        agents.extend(
            self.dynamic
                .read()
                .values()
                .filter(|a| a.is_active)
                .cloned(),
        );
        agents.retain(|a| {
            filter
                .namespace
                .as_deref()
                .map_or(true, |ns| a.namespace == ns)
                && filter.agent_type.map_or(true, |t| a.agent_type == t)
        });
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        agents
    }

    /// Summary counts over the catalogue.
    pub fn statistics(&self) -> RegistryStatistics {
        let agents = self.list(&AgentFilter::default());
        let mut agent_types: HashMap<String, usize> = HashMap::new();
        for agent in &agents {
            *agent_types
                .entry(agent.agent_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        RegistryStatistics {
            total_agents: agents.len(),
            builtin_agents: builtin::TRINITAS_AGENTS.len(),
            active_agents: agents.iter().filter(|a| a.is_active).count(),
            agent_types,
        }
    }

    /// Record activity on an agent, refreshing `last_activity`.
    pub fn touch(&self, agent_id: &str) {
        if let Some(agent) = self.dynamic.write().get_mut(agent_id) {
            agent.touch();
        }
    }
}
