//! # tmws-validate
//!
//! Pure, side-effect-free validation of every externally supplied string:
//! agent ids, namespaces, tags, file paths, and custom-agent config
//! documents. All service and server code MUST route external input
//! through this crate before persistence or filesystem access.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use tmws_core::{Result, TmwsError, MAX_CONTENT_BYTES, MAX_TAGS, MAX_TAG_BYTES};

static AGENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.-]{2,63}$").expect("agent id regex"));

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.-]{0,63}$").expect("namespace regex"));

/// Namespaces writable only by elevated/admin/system principals.
pub const RESERVED_NAMESPACES: &[&str] = &["system", "trinitas"];

/// Maximum size of a custom-agents config document.
pub const MAX_CONFIG_BYTES: usize = 1024 * 1024;

/// Maximum number of agents in one config document.
pub const MAX_CONFIG_AGENTS: usize = 1000;

fn reject(what: &str, detail: impl Into<String>) -> TmwsError {
    TmwsError::Validation(format!("{what}: {}", detail.into()))
}

/// Validate an agent identifier: `^[A-Za-z][A-Za-z0-9_.-]{2,63}$`, no
/// control characters, no path separators, no `..` segment.
pub fn validate_agent_id(s: &str) -> Result<()> {
    if s.chars().any(|c| c.is_control()) {
        return Err(reject("agent_id", "contains control characters"));
    }
    if s.contains('/') || s.contains('\\') {
        return Err(reject("agent_id", "contains path separators"));
    }
    if s.contains("..") {
        return Err(reject("agent_id", "contains '..' segment"));
    }
    if !AGENT_ID_RE.is_match(s) {
        return Err(reject(
            "agent_id",
            format!("'{s}' does not match ^[A-Za-z][A-Za-z0-9_.-]{{2,63}}$"),
        ));
    }
    Ok(())
}

/// Validate a namespace: same charset as agent ids, up to 64 characters.
pub fn validate_namespace(s: &str) -> Result<()> {
    if s.chars().any(|c| c.is_control()) {
        return Err(reject("namespace", "contains control characters"));
    }
    if s.contains("..") {
        return Err(reject("namespace", "contains '..' segment"));
    }
    if !NAMESPACE_RE.is_match(s) {
        return Err(reject("namespace", format!("'{s}' has invalid characters or length")));
    }
    Ok(())
}

/// Whether writes into `namespace` require elevated trust.
pub fn is_reserved_namespace(namespace: &str) -> bool {
    RESERVED_NAMESPACES.contains(&namespace)
}

/// NFC-normalise and trim a tag. Rejects empty results, control
/// characters, and tags over 32 bytes.
pub fn sanitize_tag(s: &str) -> Result<String> {
    let normalized: String = s.nfc().collect();
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return Err(reject("tag", "empty after trimming"));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(reject("tag", "contains control characters"));
    }
    if trimmed.len() > MAX_TAG_BYTES {
        return Err(reject(
            "tag",
            format!("'{trimmed}' exceeds {MAX_TAG_BYTES} bytes"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Sanitise a full tag list: per-tag cleanup, order-preserving
/// deduplication, at most 32 tags.
pub fn sanitize_tags(tags: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let clean = sanitize_tag(tag)?;
        if !out.contains(&clean) {
            out.push(clean);
        }
    }
    if out.len() > MAX_TAGS {
        return Err(reject("tags", format!("{} tags exceeds limit of {MAX_TAGS}", out.len())));
    }
    Ok(out)
}

/// Validate memory content: non-empty, at most 65 535 bytes, no NUL.
pub fn validate_content(content: &str) -> Result<()> {
    if content.is_empty() {
        return Err(reject("content", "must not be empty"));
    }
    if content.len() > MAX_CONTENT_BYTES {
        return Err(reject(
            "content",
            format!("{} bytes exceeds limit of {MAX_CONTENT_BYTES}", content.len()),
        ));
    }
    if content.contains('\0') {
        return Err(reject("content", "contains NUL byte"));
    }
    Ok(())
}

/// Validate an importance score: finite, within [0, 1].
pub fn validate_importance(importance: f64) -> Result<()> {
    if !importance.is_finite() || !(0.0..=1.0).contains(&importance) {
        return Err(reject("importance", format!("{importance} not in [0, 1]")));
    }
    Ok(())
}

/// Directories agent-profile files may live under. `$HOME/.claude`,
/// `$HOME/.config/claude`, `$HOME/.mcp`, plus any explicitly configured
/// extra roots.
pub fn default_path_allowlist() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(home) = dirs::home_dir() {
        roots.push(home.join(".claude"));
        roots.push(home.join(".config").join("claude"));
        roots.push(home.join(".mcp"));
    }
    roots
}

/// Canonicalise `path` (resolving symlinks and `..`) and accept it only
/// when the result sits under one of the allowlist roots. For paths that
/// do not exist yet, the parent directory is canonicalised instead so a
/// save into an allowed directory still passes.
pub fn validate_file_path(path: &Path, allowlist: &[PathBuf]) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(reject("path", "empty path"));
    }
    if path.to_string_lossy().contains('\0') {
        return Err(reject("path", "contains NUL byte"));
    }

    let canonical = match path.canonicalize() {
        Ok(p) => p,
        Err(_) => {
            // Target may not exist yet (e.g. save_agent_profiles). The
            // parent must exist and canonicalise inside the allowlist.
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .ok_or_else(|| reject("path", "no parent directory"))?;
            let file_name = path
                .file_name()
                .ok_or_else(|| reject("path", "no file name"))?;
            let canonical_parent = parent
                .canonicalize()
                .map_err(|_| reject("path", "parent directory does not resolve"))?;
            canonical_parent.join(file_name)
        }
    };

    let mut resolved_roots = Vec::with_capacity(allowlist.len());
    for root in allowlist {
        // A root that does not exist cannot contain the path.
        if let Ok(r) = root.canonicalize() {
            resolved_roots.push(r);
        }
    }

    if resolved_roots.iter().any(|root| canonical.starts_with(root)) {
        Ok(canonical)
    } else {
        Err(reject("path", "outside the allowed directories"))
    }
}

/// Validate a parsed `custom_agents.json` document. Every entry must
/// carry `name` and `full_id` (validated as agent ids) and, when present,
/// a valid `namespace`. The whole file is rejected on any invalid entry.
pub fn validate_config_content(doc: &serde_json::Value) -> Result<()> {
    let raw_len = doc.to_string().len();
    if raw_len > MAX_CONFIG_BYTES {
        return Err(reject("config", format!("{raw_len} bytes exceeds 1 MiB")));
    }

    let agents = doc
        .get("custom_agents")
        .and_then(|v| v.as_array())
        .ok_or_else(|| reject("config", "missing 'custom_agents' array"))?;

    if agents.len() > MAX_CONFIG_AGENTS {
        return Err(reject(
            "config",
            format!("{} agents exceeds limit of {MAX_CONFIG_AGENTS}", agents.len()),
        ));
    }

    for (i, entry) in agents.iter().enumerate() {
        let name = entry
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| reject("config", format!("agent #{i} missing 'name'")))?;
        validate_agent_id(name)?;

        let full_id = entry
            .get("full_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| reject("config", format!("agent #{i} missing 'full_id'")))?;
        validate_agent_id(full_id)?;

        if let Some(ns) = entry.get("namespace").and_then(|v| v.as_str()) {
            validate_namespace(ns)?;
        }
    }
    Ok(())
}
