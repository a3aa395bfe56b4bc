use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use tmws_core::{AgentRecord, AgentType, Result, TmwsError, TrustLevel};

use crate::store::MemoryStore;

const AGENT_COLUMNS: &str = "id, agent_id, display_name, agent_type, namespace, capabilities, \
     config, access_level, is_active, memory_count, last_activity, created_at, updated_at";

impl MemoryStore {
    /// Insert or update an agent row, keyed by `agent_id`.
    pub fn upsert_agent(&self, agent: &AgentRecord) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO agents (id, agent_id, display_name, agent_type, namespace, \
                 capabilities, config, access_level, is_active, memory_count, last_activity, \
                 created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
                 ON CONFLICT(agent_id) DO UPDATE SET \
                    display_name = excluded.display_name, \
                    agent_type = excluded.agent_type, \
                    namespace = excluded.namespace, \
                    capabilities = excluded.capabilities, \
                    config = excluded.config, \
                    access_level = excluded.access_level, \
                    is_active = excluded.is_active, \
                    memory_count = excluded.memory_count, \
                    last_activity = excluded.last_activity, \
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    agent.id.to_string(),
                    agent.agent_id,
                    agent.display_name,
                    agent.agent_type.as_str(),
                    agent.namespace,
                    serde_json::to_string(&agent.capabilities).unwrap_or_else(|_| "{}".into()),
                    serde_json::to_string(&agent.config).unwrap_or_else(|_| "{}".into()),
                    agent.access_level.as_str(),
                    agent.is_active as i64,
                    agent.memory_count,
                    agent.last_activity.map(|t| t.to_rfc3339()),
                    agent.created_at.to_rfc3339(),
                    agent.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Fetch one agent by its external id.
    pub fn get_agent(&self, agent_id: &str) -> Result<AgentRecord> {
        let found = self.with_tx(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {AGENT_COLUMNS} FROM agents WHERE agent_id = ?1"
            ))?;
            let mut rows = stmt.query_map([agent_id], row_to_agent)?;
            rows.next().transpose()
        })?;
        found.ok_or_else(|| TmwsError::UnknownAgent(agent_id.to_string()))
    }

    /// List agents, optionally filtered by namespace and/or type; stable
    /// ordering by agent_id ascending.
    pub fn list_agents(
        &self,
        namespace: Option<&str>,
        agent_type: Option<AgentType>,
        active_only: bool,
    ) -> Result<Vec<AgentRecord>> {
        let rows = self.with_tx(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {AGENT_COLUMNS} FROM agents ORDER BY agent_id ASC"
            ))?;
            let rows = stmt
                .query_map([], row_to_agent)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        Ok(rows
            .into_iter()
            .filter(|a| !active_only || a.is_active)
            .filter(|a| namespace.map_or(true, |ns| a.namespace == ns))
            .filter(|a| agent_type.map_or(true, |t| a.agent_type == t))
            .collect())
    }

    /// Archive an agent record (does not delete owned memories).
    pub fn archive_agent(&self, agent_id: &str) -> Result<()> {
        let changed = self.with_tx(|tx| {
            let n = tx.execute(
                "UPDATE agents SET is_active = 0, updated_at = ?2 WHERE agent_id = ?1",
                rusqlite::params![agent_id, Utc::now().to_rfc3339()],
            )?;
            Ok(n)
        })?;
        if changed == 0 {
            return Err(TmwsError::UnknownAgent(agent_id.to_string()));
        }
        Ok(())
    }

    /// Adjust the denormalised memory counter on an agent row.
    pub fn adjust_memory_count(&self, agent_id: &str, delta: i64) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE agents SET memory_count = MAX(0, memory_count + ?2), \
                 last_activity = ?3, updated_at = ?3 WHERE agent_id = ?1",
                rusqlite::params![agent_id, delta, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }
}

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    let id: String = row.get(0)?;
    let agent_type: String = row.get(3)?;
    let capabilities: String = row.get(5)?;
    let config: String = row.get(6)?;
    let access_level: String = row.get(7)?;
    let last_activity: Option<String> = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(AgentRecord {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        agent_id: row.get(1)?,
        display_name: row.get(2)?,
        agent_type: AgentType::parse(&agent_type),
        namespace: row.get(4)?,
        capabilities: serde_json::from_str(&capabilities).unwrap_or_default(),
        config: serde_json::from_str(&config).unwrap_or_default(),
        access_level: TrustLevel::parse(&access_level).unwrap_or_default(),
        is_active: row.get::<_, i64>(8)? != 0,
        memory_count: row.get(9)?,
        last_activity: last_activity.map(|t| parse_ts(&t)),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}
