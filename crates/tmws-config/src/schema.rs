use serde::{Deserialize, Serialize};
use tracing::warn;

use tmws_core::{Result, TmwsError, DEFAULT_VECTOR_DIMENSION};

/// Deployment environment; hardening checks tighten with each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "development" => Some(Environment::Development),
            "staging" => Some(Environment::Staging),
            "production" => Some(Environment::Production),
            _ => None,
        }
    }
}

/// Secret keys nobody should deploy with.
const WEAK_SECRET_KEYS: &[&str] = &[
    "changeme",
    "secret",
    "password",
    "development",
    "test-secret-key",
    "tmws-secret-key",
    "0123456789abcdef0123456789abcdef",
];

/// Minimum secret key length.
pub const MIN_SECRET_KEY_LEN: usize = 32;

/// A non-fatal or fatal finding from config validation.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

/// Runtime configuration, assembled from the `TMWS_*` environment
/// allowlist. Anything outside the allowlist is ignored.
#[derive(Debug, Clone)]
pub struct TmwsConfig {
    /// Persistence endpoint (a SQLite path, optionally `sqlite://`-prefixed).
    pub database_url: String,
    /// Session token signing key. Required in production.
    pub secret_key: Option<String>,
    pub environment: Environment,
    /// Default principal for new sessions.
    pub agent_id: Option<String>,
    pub agent_namespace: Option<String>,
    pub agent_capabilities: Option<serde_json::Value>,
    /// Development fallback: sessions without an asserted identity get a
    /// default agent.
    pub allow_default_agent: bool,
    pub rate_limit_requests: Option<u32>,
    pub rate_limit_period_secs: Option<u64>,
    pub embedding_model: String,
    pub vector_dimension: usize,
    pub log_level: String,
}

impl Default for TmwsConfig {
    fn default() -> Self {
        Self {
            database_url: "tmws.db".to_string(),
            secret_key: None,
            environment: Environment::Development,
            agent_id: None,
            agent_namespace: None,
            agent_capabilities: None,
            allow_default_agent: false,
            rate_limit_requests: None,
            rate_limit_period_secs: None,
            embedding_model: "feature-hash".to_string(),
            vector_dimension: DEFAULT_VECTOR_DIMENSION,
            log_level: "info".to_string(),
        }
    }
}

impl TmwsConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a lookup function (tests inject maps).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = TmwsConfig::default();

        config.database_url = lookup("TMWS_DATABASE_URL").ok_or_else(|| {
            TmwsError::Validation("TMWS_DATABASE_URL is required".to_string())
        })?;
        config.secret_key = lookup("TMWS_SECRET_KEY");

        if let Some(env) = lookup("TMWS_ENVIRONMENT") {
            config.environment = Environment::parse(&env).ok_or_else(|| {
                TmwsError::Validation(format!("TMWS_ENVIRONMENT '{env}' is not one of development|staging|production"))
            })?;
        }

        if let Some(agent_id) = lookup("TMWS_AGENT_ID") {
            tmws_validate::validate_agent_id(&agent_id)?;
            config.agent_id = Some(agent_id);
        }
        if let Some(namespace) = lookup("TMWS_AGENT_NAMESPACE") {
            tmws_validate::validate_namespace(&namespace)?;
            config.agent_namespace = Some(namespace);
        }
        if let Some(caps) = lookup("TMWS_AGENT_CAPABILITIES") {
            let parsed: serde_json::Value = serde_json::from_str(&caps).map_err(|e| {
                TmwsError::Validation(format!("TMWS_AGENT_CAPABILITIES is not valid JSON: {e}"))
            })?;
            config.agent_capabilities = Some(parsed);
        }

        config.allow_default_agent = lookup("TMWS_ALLOW_DEFAULT_AGENT")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        if let Some(v) = lookup("TMWS_RATE_LIMIT_REQUESTS") {
            config.rate_limit_requests = Some(v.parse().map_err(|_| {
                TmwsError::Validation(format!("TMWS_RATE_LIMIT_REQUESTS '{v}' is not a number"))
            })?);
        }
        if let Some(v) = lookup("TMWS_RATE_LIMIT_PERIOD") {
            config.rate_limit_period_secs = Some(v.parse().map_err(|_| {
                TmwsError::Validation(format!("TMWS_RATE_LIMIT_PERIOD '{v}' is not a number"))
            })?);
        }

        if let Some(model) = lookup("TMWS_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(dim) = lookup("TMWS_VECTOR_DIMENSION") {
            config.vector_dimension = dim.parse().map_err(|_| {
                TmwsError::Validation(format!("TMWS_VECTOR_DIMENSION '{dim}' is not a number"))
            })?;
        }
        if let Some(level) = lookup("TMWS_LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// The filesystem path inside `database_url`.
    pub fn database_path(&self) -> &str {
        self.database_url
            .strip_prefix("sqlite://")
            .unwrap_or(&self.database_url)
    }

    /// Validate the configuration. Returns the warning list, or an error
    /// string when any finding is fatal for the current environment.
    pub fn validate(&self) -> std::result::Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();
        let production = self.environment == Environment::Production;

        match &self.secret_key {
            None => warnings.push(ConfigWarning {
                field: "secret_key".into(),
                message: "TMWS_SECRET_KEY is not set".into(),
                severity: if production {
                    WarningSeverity::Error
                } else {
                    WarningSeverity::Warning
                },
            }),
            Some(key) => {
                if key.len() < MIN_SECRET_KEY_LEN {
                    warnings.push(ConfigWarning {
                        field: "secret_key".into(),
                        message: format!(
                            "secret key is {} chars, minimum is {MIN_SECRET_KEY_LEN}",
                            key.len()
                        ),
                        severity: if production {
                            WarningSeverity::Error
                        } else {
                            WarningSeverity::Warning
                        },
                    });
                }
                if is_weak_secret(key) {
                    warnings.push(ConfigWarning {
                        field: "secret_key".into(),
                        message: "secret key matches a known-weak value".into(),
                        severity: if production {
                            WarningSeverity::Error
                        } else {
                            WarningSeverity::Warning
                        },
                    });
                }
            }
        }

        if self.vector_dimension == 0 || self.vector_dimension > 8192 {
            warnings.push(ConfigWarning {
                field: "vector_dimension".into(),
                message: format!("vector dimension {} is out of range", self.vector_dimension),
                severity: WarningSeverity::Error,
            });
        }

        if production && self.allow_default_agent {
            warnings.push(ConfigWarning {
                field: "allow_default_agent".into(),
                message: "default-agent fallback is enabled in production".into(),
                severity: WarningSeverity::Warning,
            });
        }

        if let Some(rate) = self.rate_limit_requests {
            if rate == 0 {
                warnings.push(ConfigWarning {
                    field: "rate_limit_requests".into(),
                    message: "a zero request quota blocks every caller".into(),
                    severity: WarningSeverity::Warning,
                });
            }
        }

        for w in warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Warning)
        {
            warn!(field = %w.field, "{}", w.message);
        }

        if let Some(fatal) = warnings
            .iter()
            .find(|w| w.severity == WarningSeverity::Error)
        {
            return Err(format!("{}: {}", fatal.field, fatal.message));
        }
        Ok(warnings)
    }
}

fn is_weak_secret(key: &str) -> bool {
    let lowered = key.to_lowercase();
    if WEAK_SECRET_KEYS.iter().any(|weak| lowered == *weak) {
        return true;
    }
    // A single repeated character is never acceptable.
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn database_url_is_required() {
        let err = TmwsConfig::from_lookup(|_| None).unwrap_err();
        assert_eq!(err.wire_code(), "ErrValidation");
    }

    #[test]
    fn parses_full_environment() {
        let mut map = HashMap::new();
        map.insert("TMWS_DATABASE_URL", "sqlite:///var/lib/tmws/tmws.db");
        map.insert("TMWS_SECRET_KEY", "0f8e7d6c5b4a39281706f5e4d3c2b1a0ffeeddcc");
        map.insert("TMWS_ENVIRONMENT", "staging");
        map.insert("TMWS_AGENT_ID", "athena-conductor");
        map.insert("TMWS_VECTOR_DIMENSION", "512");
        map.insert("TMWS_RATE_LIMIT_REQUESTS", "2000");

        let config = TmwsConfig::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(config.database_path(), "/var/lib/tmws/tmws.db");
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.agent_id.as_deref(), Some("athena-conductor"));
        assert_eq!(config.vector_dimension, 512);
        assert_eq!(config.rate_limit_requests, Some(2000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_agent_id_from_env() {
        let mut map = HashMap::new();
        map.insert("TMWS_DATABASE_URL", "tmws.db");
        map.insert("TMWS_AGENT_ID", "'; DROP TABLE agents; --");
        assert!(TmwsConfig::from_lookup(lookup_from(&map)).is_err());
    }

    #[test]
    fn rejects_unknown_environment() {
        let mut map = HashMap::new();
        map.insert("TMWS_DATABASE_URL", "tmws.db");
        map.insert("TMWS_ENVIRONMENT", "prod");
        assert!(TmwsConfig::from_lookup(lookup_from(&map)).is_err());
    }

    #[test]
    fn production_requires_strong_secret() {
        let mut config = TmwsConfig {
            environment: Environment::Production,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.secret_key = Some("changeme".into());
        assert!(config.validate().is_err());

        config.secret_key = Some("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into());
        assert!(config.validate().is_err(), "repeated char key must fail");

        config.secret_key = Some("8b1a9953c4611296a827abf8c47804d7e6c49f51".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn development_tolerates_missing_secret() {
        let config = TmwsConfig::default();
        assert!(config.validate().is_ok());
    }
}
