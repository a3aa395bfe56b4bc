use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a memory row.
pub type MemoryId = Uuid;

/// Unique identifier for a client session.
pub type SessionId = Uuid;

/// Default embedding dimensionality (all-MiniLM-L6-v2).
pub const DEFAULT_VECTOR_DIMENSION: usize = 384;

/// Maximum memory content size in bytes.
pub const MAX_CONTENT_BYTES: usize = 65_535;

/// Maximum number of tags on one memory.
pub const MAX_TAGS: usize = 32;

/// Maximum byte length of one tag.
pub const MAX_TAG_BYTES: usize = 32;

/// Maximum size of one wire frame.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// How many prior agents a session context remembers.
pub const AGENT_HISTORY_LIMIT: usize = 16;

/// Maximum concurrent client sessions.
pub const MAX_SESSIONS: usize = 1024;

/// Bound on the ancestor walk when checking the memory hierarchy for cycles.
pub const PARENT_WALK_LIMIT: usize = 64;

/// Visibility of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    Private,
    Team,
    Shared,
    Public,
    System,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Private => "private",
            AccessLevel::Team => "team",
            AccessLevel::Shared => "shared",
            AccessLevel::Public => "public",
            AccessLevel::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(AccessLevel::Private),
            "team" => Some(AccessLevel::Team),
            "shared" => Some(AccessLevel::Shared),
            "public" => Some(AccessLevel::Public),
            "system" => Some(AccessLevel::System),
            _ => None,
        }
    }
}

/// How much the service trusts an agent. Variant order matters: gates
/// compare with `>=`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Readonly,
    #[default]
    Standard,
    Elevated,
    Admin,
    System,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Readonly => "readonly",
            TrustLevel::Standard => "standard",
            TrustLevel::Elevated => "elevated",
            TrustLevel::Admin => "admin",
            TrustLevel::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "readonly" => Some(TrustLevel::Readonly),
            "standard" => Some(TrustLevel::Standard),
            "elevated" => Some(TrustLevel::Elevated),
            "admin" => Some(TrustLevel::Admin),
            "system" => Some(TrustLevel::System),
            _ => None,
        }
    }
}

/// Kind of calling principal. Open vocabulary: anything unrecognised
/// deserializes as `custom_agent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    AnthropicLlm,
    OpenaiLlm,
    GoogleLlm,
    MetaLlm,
    SystemAgent,
    #[default]
    #[serde(other)]
    CustomAgent,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::AnthropicLlm => "anthropic_llm",
            AgentType::OpenaiLlm => "openai_llm",
            AgentType::GoogleLlm => "google_llm",
            AgentType::MetaLlm => "meta_llm",
            AgentType::SystemAgent => "system_agent",
            AgentType::CustomAgent => "custom_agent",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "anthropic_llm" => AgentType::AnthropicLlm,
            "openai_llm" => AgentType::OpenaiLlm,
            "google_llm" => AgentType::GoogleLlm,
            "meta_llm" => AgentType::MetaLlm,
            "system_agent" => AgentType::SystemAgent,
            _ => AgentType::CustomAgent,
        }
    }
}

/// Permission granted by a share edge. Higher variants imply lower ones:
/// `write` implies `read`, `delete` implies `write`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Read,
    Write,
    Delete,
}

impl Permission {
    /// Whether a grant of `self` is sufficient for an operation that
    /// requires `required`.
    pub fn allows(&self, required: Permission) -> bool {
        *self >= required
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Permission::Read),
            "write" => Some(Permission::Write),
            "delete" => Some(Permission::Delete),
            _ => None,
        }
    }
}

/// The operation a principal is attempting on a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Delete,
    Share,
}

impl Operation {
    /// Minimum share permission that covers this operation.
    pub fn required_permission(&self) -> Permission {
        match self {
            Operation::Read => Permission::Read,
            Operation::Write => Permission::Write,
            Operation::Delete | Operation::Share => Permission::Delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_level_ordering() {
        assert!(TrustLevel::System > TrustLevel::Admin);
        assert!(TrustLevel::Admin > TrustLevel::Elevated);
        assert!(TrustLevel::Elevated > TrustLevel::Standard);
        assert!(TrustLevel::Standard > TrustLevel::Readonly);
    }

    #[test]
    fn permission_implication() {
        assert!(Permission::Delete.allows(Permission::Read));
        assert!(Permission::Write.allows(Permission::Read));
        assert!(!Permission::Read.allows(Permission::Write));
    }

    #[test]
    fn agent_type_open_vocabulary() {
        let t: AgentType = serde_json::from_str("\"anthropic_llm\"").unwrap();
        assert_eq!(t, AgentType::AnthropicLlm);
        let t: AgentType = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(t, AgentType::CustomAgent);
    }

    #[test]
    fn access_level_roundtrip() {
        for level in ["private", "team", "shared", "public", "system"] {
            let parsed = AccessLevel::parse(level).unwrap();
            assert_eq!(parsed.as_str(), level);
        }
        assert!(AccessLevel::parse("internal").is_none());
    }
}
