//! Loader for `custom_agents.json`.
//!
//! Search order: `./custom_agents.json`, `$HOME/.tmws/custom_agents.json`,
//! `/etc/tmws/custom_agents.json`; the first hit wins. Unknown fields are
//! ignored; any invalid entry rejects the whole file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use tmws_core::{Result, TmwsError};
use tmws_validate::MAX_CONFIG_BYTES;

/// A parsed custom-agents document.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomAgentsFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub custom_agents: Vec<CustomAgentEntry>,
}

/// One declared agent.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomAgentEntry {
    pub name: String,
    pub full_id: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub access_level: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The candidate locations, in precedence order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("custom_agents.json")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".tmws").join("custom_agents.json"));
    }
    paths.push(PathBuf::from("/etc/tmws/custom_agents.json"));
    paths
}

/// Load the first custom-agents file found on the search path, if any.
pub fn load_custom_agents() -> Result<Option<CustomAgentsFile>> {
    for path in search_paths() {
        if path.is_file() {
            info!(?path, "loading custom agent profiles");
            return load_from_path(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load and validate one custom-agents file.
pub fn load_from_path(path: &Path) -> Result<CustomAgentsFile> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() as usize > MAX_CONFIG_BYTES {
        return Err(TmwsError::Validation(format!(
            "custom agents file is {} bytes, limit is 1 MiB",
            metadata.len()
        )));
    }

    let raw = std::fs::read_to_string(path)?;
    let doc: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| TmwsError::Validation(format!("custom agents file is not valid JSON: {e}")))?;

    tmws_validate::validate_config_content(&doc)?;

    let file: CustomAgentsFile = serde_json::from_value(doc)
        .map_err(|e| TmwsError::Validation(format!("custom agents file has invalid shape: {e}")))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_valid_file_ignoring_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom_agents.json");
        std::fs::write(
            &path,
            r#"{
                "version": "1.0",
                "future_field": {"ignored": true},
                "custom_agents": [
                    {
                        "name": "helper",
                        "full_id": "helper-agent",
                        "namespace": "default",
                        "display_name": "Helper",
                        "access_level": "standard",
                        "capabilities": ["summarize"],
                        "metadata": {"team": "platform"}
                    }
                ]
            }"#,
        )
        .unwrap();

        let file = load_from_path(&path).unwrap();
        assert_eq!(file.version.as_deref(), Some("1.0"));
        assert_eq!(file.custom_agents.len(), 1);
        assert_eq!(file.custom_agents[0].full_id, "helper-agent");
        assert_eq!(file.custom_agents[0].capabilities, vec!["summarize"]);
    }

    #[test]
    fn one_bad_entry_rejects_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom_agents.json");
        std::fs::write(
            &path,
            r#"{
                "custom_agents": [
                    {"name": "good", "full_id": "good-agent"},
                    {"name": "'; DROP TABLE agents; --", "full_id": "bad-agent"}
                ]
            }"#,
        )
        .unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert_eq!(err.wire_code(), "ErrValidation");
    }

    #[test]
    fn non_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom_agents.json");
        std::fs::write(&path, "version = 1").unwrap();
        assert!(load_from_path(&path).is_err());
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom_agents.json");
        let padding = "x".repeat(MAX_CONFIG_BYTES + 1);
        std::fs::write(&path, format!("{{\"pad\": \"{padding}\"}}")).unwrap();
        assert!(load_from_path(&path).is_err());
    }
}
