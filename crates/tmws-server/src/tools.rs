//! The tool surface. A static table maps tool names to handlers; each
//! handler parses a typed params struct, resolves the session's current
//! agent, and delegates to the registry or the memory service.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex as TokioMutex;

use tmws_core::{AgentRecord, AgentType, Result, TmwsError, TrustLevel};
use tmws_registry::{AgentFilter, RegisterSpec};
use tmws_service::{
    CreateMemoryRequest, DeleteMemoryRequest, RecallMemoriesRequest, SearchMemoriesRequest,
    ShareMemoryRequest, UpdateMemoryRequest,
};

use crate::router::{HandlerFuture, ToolHandler};
use crate::session::Session;
use crate::state::ServerState;

pub fn table() -> HashMap<&'static str, ToolHandler> {
    let mut table: HashMap<&'static str, ToolHandler> = HashMap::new();
    table.insert("get_agent_info", get_agent_info);
    table.insert("switch_agent", switch_agent);
    table.insert("get_current_agent", get_current_agent);
    table.insert("execute_as_agent", execute_as_agent);
    table.insert("list_trinitas_agents", list_trinitas_agents);
    table.insert("register_agent", register_agent);
    table.insert("unregister_agent", unregister_agent);
    table.insert("create_memory", create_memory);
    table.insert("search_memories", search_memories);
    table.insert("share_memory", share_memory);
    table.insert("update_memory", update_memory);
    table.insert("delete_memory", delete_memory);
    table.insert("recall_memories", recall_memories);
    table.insert("get_agent_statistics", get_agent_statistics);
    table.insert("list_agents", list_agents);
    table.insert("save_agent_profiles", save_agent_profiles);
    table.insert("load_agent_profiles", load_agent_profiles);
    table
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| TmwsError::Validation(format!("invalid parameters: {e}")))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

async fn current_principal(
    state: &ServerState,
    session: &TokioMutex<Session>,
) -> Result<AgentRecord> {
    let current = session.lock().await.context.current().to_string();
    state.registry.resolve(&current)
}

// ── Agent context tools ────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetAgentInfoParams {
    #[serde(default)]
    agent_name: Option<String>,
}

fn get_agent_info(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let p: GetAgentInfoParams = parse(params)?;
        let agent = match p.agent_name {
            Some(name) => state.registry.resolve(&name)?,
            None => current_principal(&state, &session).await?,
        };
        to_value(&agent)
    })
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AgentNameParams {
    name: String,
}

fn switch_agent(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let p: AgentNameParams = parse(params)?;
        // Unknown names error; switching never auto-registers.
        let target = state.registry.resolve(&p.name)?;
        let mut session = session.lock().await;
        let previous = session.context.current().to_string();
        session.context.switch(target.agent_id.clone());
        Ok(json!({
            "previous_agent": previous,
            "current_agent": target,
            "switch_count": session.context.switch_count(),
        }))
    })
}

fn get_current_agent(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    _params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let (current, history, switch_count, started) = {
            let session = session.lock().await;
            (
                session.context.current().to_string(),
                session.context.recent_history(5),
                session.context.switch_count(),
                session.context.session_start(),
            )
        };
        let agent = state.registry.resolve(&current)?;
        Ok(json!({
            "current_agent": agent,
            "history": history,
            "switch_count": switch_count,
            "session_started": started,
        }))
    })
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecuteAsParams {
    name: String,
    action: String,
    #[serde(default)]
    params: Value,
}

fn execute_as_agent(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let p: ExecuteAsParams = parse(params)?;
        if p.action == "execute_as_agent" {
            return Err(TmwsError::Validation(
                "execute_as_agent cannot be nested".into(),
            ));
        }
        let target = state.registry.resolve(&p.name)?;
        let principal = current_principal(&state, &session).await?;
        if target.agent_id != principal.agent_id
            && principal.access_level < TrustLevel::Elevated
        {
            return Err(TmwsError::Permission(
                "acting as another agent requires elevated trust".into(),
            ));
        }
        let handler = state
            .router
            .get(&p.action)
            .ok_or_else(|| TmwsError::UnknownTool(p.action.clone()))?;
        let inner_params = if p.params.is_null() {
            Value::Object(Default::default())
        } else {
            p.params
        };

        // Swap the slot for the scoped call and restore it on every exit
        // path; errors pass through after the restore.
        let prior = session.lock().await.context.swap(target.agent_id.clone());
        let result = handler(Arc::clone(&state), Arc::clone(&session), inner_params).await;
        session.lock().await.context.restore(prior);

        let inner_result = result?;
        Ok(json!({
            "executed_as": target.agent_id,
            "action": p.action,
            "result": inner_result,
        }))
    })
}

// ── Registry tools ─────────────────────────────────────────────

fn list_trinitas_agents(
    state: Arc<ServerState>,
    _session: Arc<TokioMutex<Session>>,
    _params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let agents = state.registry.list(&AgentFilter::default());
        Ok(json!({
            "agents": agents,
            "aliases": tmws_registry::ALIASES
                .iter()
                .map(|(alias, id)| json!({"alias": alias, "agent_id": id}))
                .collect::<Vec<_>>(),
        }))
    })
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RegisterAgentParams {
    #[serde(alias = "agent_name")]
    agent_id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    agent_type: AgentType,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    capabilities: BTreeMap<String, Value>,
    #[serde(default)]
    access_level: TrustLevel,
    #[serde(default)]
    persist: bool,
}

fn register_agent(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let p: RegisterAgentParams = parse(params)?;
        let principal = current_principal(&state, &session).await?;
        if p.access_level > principal.access_level {
            return Err(TmwsError::Permission(format!(
                "cannot register an agent with {} trust from a {} principal",
                p.access_level.as_str(),
                principal.access_level.as_str()
            )));
        }
        let agent = state.registry.register(
            RegisterSpec {
                agent_id: p.agent_id,
                display_name: p.display_name,
                agent_type: p.agent_type,
                namespace: p.namespace,
                capabilities: p.capabilities,
                access_level: p.access_level,
            },
            p.persist,
        )?;
        to_value(&agent)
    })
}

fn unregister_agent(
    state: Arc<ServerState>,
    _session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let p: AgentNameParams = parse(params)?;
        state.registry.unregister(&p.name)?;
        Ok(json!({"unregistered": p.name}))
    })
}

fn list_agents(
    state: Arc<ServerState>,
    _session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let filter: AgentFilter = parse(params)?;
        let agents = state.registry.list(&filter);
        let count = agents.len();
        Ok(json!({"agents": agents, "count": count}))
    })
}

fn get_agent_statistics(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    _params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let principal = current_principal(&state, &session).await?;
        let stats = state.registry.statistics();
        let memory_count = state.service.store().count_memories(&principal.agent_id)?;
        Ok(json!({
            "registry": stats,
            "current_agent": principal.agent_id,
            "memory_count": memory_count,
            "open_sessions": state.sessions.count(),
            "uptime_secs": state.metrics.uptime_secs(),
        }))
    })
}

// ── Memory tools ───────────────────────────────────────────────

fn create_memory(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let req: CreateMemoryRequest = parse(params)?;
        let principal = current_principal(&state, &session).await?;
        let memory = state.service.create_memory(&principal, req).await?;
        to_value(&memory)
    })
}

fn search_memories(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let req: SearchMemoriesRequest = parse(params)?;
        let principal = current_principal(&state, &session).await?;
        let results = state.service.search_memories(&principal, req).await?;
        let count = results.len();
        Ok(json!({"results": results, "count": count}))
    })
}

fn share_memory(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let req: ShareMemoryRequest = parse(params)?;
        let principal = current_principal(&state, &session).await?;
        let memory = state.service.share_memory(&principal, req)?;
        to_value(&memory)
    })
}

fn update_memory(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let req: UpdateMemoryRequest = parse(params)?;
        let principal = current_principal(&state, &session).await?;
        let memory = state.service.update_memory(&principal, req).await?;
        to_value(&memory)
    })
}

fn delete_memory(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let req: DeleteMemoryRequest = parse(params)?;
        let memory_id = req.memory_id;
        let hard = req.hard;
        let principal = current_principal(&state, &session).await?;
        state.service.delete_memory(&principal, req)?;
        Ok(json!({"deleted": memory_id, "hard": hard}))
    })
}

fn recall_memories(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let req: RecallMemoriesRequest = parse(params)?;
        let principal = current_principal(&state, &session).await?;
        let memories = state.service.recall(&principal, req)?;
        let count = memories.len();
        Ok(json!({"memories": memories, "count": count}))
    })
}

// ── Profile file tools ─────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfilePathParams {
    path: String,
    #[serde(default)]
    persist: bool,
}

fn save_agent_profiles(
    state: Arc<ServerState>,
    _session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let p: ProfilePathParams = parse(params)?;
        let path = tmws_validate::validate_file_path(Path::new(&p.path), &state.path_allowlist)?;

        let entries: Vec<Value> = state
            .registry
            .list(&AgentFilter::default())
            .into_iter()
            .filter(|a| !tmws_registry::is_builtin(&a.agent_id))
            .map(|a| {
                json!({
                    "name": a.agent_id,
                    "full_id": a.agent_id,
                    "namespace": a.namespace,
                    "display_name": a.display_name,
                    "access_level": a.access_level,
                    "capabilities": a.capabilities.keys().collect::<Vec<_>>(),
                    "metadata": {},
                })
            })
            .collect();

        let saved = entries.len();
        let doc = json!({"version": "1.0", "custom_agents": entries});
        std::fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
        Ok(json!({"saved": saved}))
    })
}

fn load_agent_profiles(
    state: Arc<ServerState>,
    session: Arc<TokioMutex<Session>>,
    params: Value,
) -> HandlerFuture {
    Box::pin(async move {
        let p: ProfilePathParams = parse(params)?;
        let path = tmws_validate::validate_file_path(Path::new(&p.path), &state.path_allowlist)?;
        let file = tmws_config::load_from_path(&path)?;
        let principal = current_principal(&state, &session).await?;

        let mut loaded = 0usize;
        let mut skipped = 0usize;
        for entry in file.custom_agents {
            let requested = entry
                .access_level
                .as_deref()
                .and_then(TrustLevel::parse)
                .unwrap_or_default();
            // A profile file cannot raise an agent above the loader.
            let access_level = requested.min(principal.access_level);
            let spec = RegisterSpec {
                agent_id: entry.full_id,
                display_name: entry.display_name,
                agent_type: Default::default(),
                namespace: entry.namespace,
                capabilities: entry
                    .capabilities
                    .into_iter()
                    .map(|c| (c, Value::Bool(true)))
                    .collect(),
                access_level,
            };
            match state.registry.register(spec, p.persist) {
                Ok(_) => loaded += 1,
                Err(TmwsError::DuplicateId(_)) | Err(TmwsError::NameConflict(_)) => skipped += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(json!({"loaded": loaded, "skipped": skipped}))
    })
}
