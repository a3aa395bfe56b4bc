use tracing::debug;

use tmws_core::{AccessLevel, AgentRecord, MemoryRecord, Operation, Result, TmwsError, TrustLevel};

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Convert to a result, mapping `Deny` to `ErrPermission`.
    pub fn into_result(self) -> Result<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(TmwsError::Permission(reason)),
        }
    }
}

fn deny(reason: impl Into<String>) -> Decision {
    Decision::Deny(reason.into())
}

/// Evaluate `(principal, operation, resource)` against the default
/// policies, in order: self-access, trust-level overrides, the
/// resource's access-level gate, default deny. The first matching rule
/// wins for Allow; a gate's Deny is final.
pub fn evaluate(principal: &AgentRecord, op: Operation, resource: &MemoryRecord) -> Decision {
    // 1. Self-access: owners do anything to their own memories.
    if principal.agent_id == resource.owner_agent_id {
        return Decision::Allow;
    }

    // Readonly principals never mutate anything.
    if !matches!(op, Operation::Read) && principal.access_level == TrustLevel::Readonly {
        return deny("readonly principals cannot modify memories");
    }

    // 2. Trust-level overrides.
    match principal.access_level {
        TrustLevel::System => {
            if matches!(op, Operation::Read | Operation::Write) {
                return Decision::Allow;
            }
        }
        TrustLevel::Elevated | TrustLevel::Admin => {
            if matches!(op, Operation::Read) {
                return Decision::Allow;
            }
            if matches!(op, Operation::Write)
                && (resource.namespace == principal.namespace
                    || principal.access_level >= TrustLevel::Admin)
            {
                return Decision::Allow;
            }
        }
        _ => {}
    }

    // 3. Access-level gates on the resource.
    let decision = match resource.access_level {
        AccessLevel::Private => deny(format!(
            "memory is private to {}",
            resource.owner_agent_id
        )),
        AccessLevel::Team => {
            if principal.namespace == resource.namespace && matches!(op, Operation::Read) {
                Decision::Allow
            } else {
                deny("team memories are readable within their namespace only")
            }
        }
        AccessLevel::Shared => match resource.grant_for(&principal.agent_id) {
            Some(granted) if granted.allows(op.required_permission()) => Decision::Allow,
            Some(_) => deny("share grant does not cover this operation"),
            None => deny("memory is not shared with this agent"),
        },
        AccessLevel::Public => {
            if matches!(op, Operation::Read) {
                Decision::Allow
            } else {
                deny("public memories are writable by their owner only")
            }
        }
        AccessLevel::System => {
            if matches!(op, Operation::Read) && principal.access_level >= TrustLevel::Elevated {
                Decision::Allow
            } else if principal.access_level == TrustLevel::System {
                Decision::Allow
            } else {
                deny("system memories require elevated trust")
            }
        }
    };

    if let Decision::Deny(ref reason) = decision {
        debug!(
            principal = %principal.agent_id,
            memory = %resource.id,
            ?op,
            reason,
            "access denied"
        );
    }
    decision
}

/// Writes into reserved namespaces (`system`, `trinitas`) require
/// elevated trust. Applied at memory creation and agent registration.
pub fn check_namespace_write(principal: &AgentRecord, namespace: &str) -> Decision {
    if tmws_validate::is_reserved_namespace(namespace)
        && principal.access_level < TrustLevel::Elevated
    {
        return deny(format!("namespace '{namespace}' is reserved"));
    }
    Decision::Allow
}
