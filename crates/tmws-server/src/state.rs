use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use tmws_config::{Environment, TmwsConfig};
use tmws_core::{Result, TmwsError, TrustLevel};
use tmws_embedding::{EmbeddingGateway, EmbeddingProvider, HashEmbedding, OpenAiEmbedding};
use tmws_policy::{AgentRateLimiter, RateLimitConfig};
use tmws_registry::{AgentRegistry, RegisterSpec};
use tmws_service::MemoryService;
use tmws_storage::MemoryStore;

use crate::auth;
use crate::metrics::Metrics;
use crate::router::ToolRouter;
use crate::session::SessionManager;

/// Development fallback principal.
pub const DEFAULT_AGENT_ID: &str = "athena-conductor";

/// Everything the tool handlers need, shared across sessions.
pub struct ServerState {
    pub config: TmwsConfig,
    pub service: MemoryService,
    pub registry: Arc<AgentRegistry>,
    pub sessions: SessionManager,
    pub router: ToolRouter,
    pub metrics: Metrics,
    /// Roots agent-profile files may live under.
    pub path_allowlist: Vec<PathBuf>,
}

impl ServerState {
    /// Wire up storage, embedder, registry, and service from config.
    pub fn build(config: TmwsConfig) -> Result<Arc<Self>> {
        let store = MemoryStore::open(Path::new(config.database_path()))?;

        let provider: Arc<dyn EmbeddingProvider> = match config.embedding_model.as_str() {
            "" | "feature-hash" => Arc::new(HashEmbedding::new(config.vector_dimension)),
            model => {
                let mut remote = OpenAiEmbedding::new(model, config.vector_dimension);
                if let Ok(key) = std::env::var("TMWS_EMBEDDING_API_KEY") {
                    remote = remote.with_api_key(key);
                }
                if let Ok(url) = std::env::var("TMWS_EMBEDDING_BASE_URL") {
                    remote = remote.with_base_url(url);
                }
                Arc::new(remote)
            }
        };
        info!(provider = provider.name(), dims = provider.dimensions(), "embedding gateway ready");
        let gateway = Arc::new(EmbeddingGateway::new(provider));

        let registry = Arc::new(AgentRegistry::new(store.clone())?);
        seed_custom_agents(&registry);

        let limiter = AgentRateLimiter::new(rate_limits(&config));
        let service = MemoryService::new(store, gateway, Arc::clone(&registry), limiter);

        Ok(Arc::new(Self {
            config,
            service,
            registry,
            sessions: SessionManager::new(),
            router: ToolRouter::new(),
            metrics: Metrics::new(),
            path_allowlist: tmws_validate::default_path_allowlist(),
        }))
    }

    /// Determine the principal a new session starts as.
    ///
    /// A bearer token always wins. Without one, production refuses the
    /// session; development falls back to `TMWS_AGENT_ID` or the default
    /// agent.
    pub fn session_agent(&self, bearer_token: Option<&str>) -> Result<String> {
        if let Some(token) = bearer_token {
            let secret = self.config.secret_key.as_deref().ok_or_else(|| {
                TmwsError::Permission("server has no secret key to verify tokens".into())
            })?;
            let asserted = auth::verify_token(secret, token)?;
            self.registry.resolve(&asserted)?;
            return Ok(asserted);
        }

        if self.config.environment == Environment::Production {
            return Err(TmwsError::Permission(
                "authentication is required in production".into(),
            ));
        }

        if let Some(ref agent_id) = self.config.agent_id {
            return Ok(agent_id.clone());
        }
        if self.config.environment == Environment::Development || self.config.allow_default_agent {
            return Ok(DEFAULT_AGENT_ID.to_string());
        }
        Err(TmwsError::Permission(
            "no session identity: set TMWS_AGENT_ID or enable TMWS_ALLOW_DEFAULT_AGENT".into(),
        ))
    }
}

fn rate_limits(config: &TmwsConfig) -> RateLimitConfig {
    let mut limits = RateLimitConfig::default();
    if let Some(requests) = config.rate_limit_requests {
        // The env pair expresses "N requests per P seconds"; buckets
        // refill per minute.
        let period = config.rate_limit_period_secs.unwrap_or(60).max(1);
        limits.requests_per_min = ((requests as u64 * 60) / period).max(1) as u32;
    }
    limits
}

fn seed_custom_agents(registry: &AgentRegistry) {
    match tmws_config::load_custom_agents() {
        Ok(None) => {}
        Ok(Some(file)) => {
            for entry in file.custom_agents {
                let spec = RegisterSpec {
                    agent_id: entry.full_id.clone(),
                    display_name: entry.display_name,
                    agent_type: Default::default(),
                    namespace: entry.namespace,
                    capabilities: entry
                        .capabilities
                        .into_iter()
                        .map(|c| (c, serde_json::Value::Bool(true)))
                        .collect(),
                    access_level: entry
                        .access_level
                        .as_deref()
                        .and_then(TrustLevel::parse)
                        .unwrap_or_default(),
                };
                match registry.register(spec, false) {
                    Ok(agent) => info!(agent = %agent.agent_id, "custom agent loaded"),
                    Err(e) => warn!(agent = %entry.full_id, error = %e, "skipping custom agent"),
                }
            }
        }
        Err(e) => warn!(error = %e, "custom agents file rejected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> TmwsConfig {
        TmwsConfig {
            database_url: ":memory:".into(),
            ..Default::default()
        }
    }

    #[test]
    fn development_falls_back_to_default_agent() {
        let state = ServerState::build(dev_config()).unwrap();
        assert_eq!(state.session_agent(None).unwrap(), DEFAULT_AGENT_ID);
    }

    #[test]
    fn production_requires_a_token() {
        let mut config = dev_config();
        config.environment = Environment::Production;
        config.secret_key = Some("8b1a9953c4611296a827abf8c47804d7e6c49f51".into());
        let state = ServerState::build(config).unwrap();

        assert_eq!(
            state.session_agent(None).unwrap_err().wire_code(),
            "ErrPermission"
        );

        let token = auth::make_token(
            state.config.secret_key.as_deref().unwrap(),
            "athena-conductor",
        );
        assert_eq!(state.session_agent(Some(&token)).unwrap(), "athena-conductor");
    }

    #[test]
    fn env_pair_scales_to_per_minute() {
        let mut config = dev_config();
        config.rate_limit_requests = Some(100);
        config.rate_limit_period_secs = Some(30);
        assert_eq!(rate_limits(&config).requests_per_min, 200);
    }
}
