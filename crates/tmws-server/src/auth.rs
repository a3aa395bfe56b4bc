//! Session token signing.
//!
//! A token asserts an agent identity: `agent_id:hex(blake3_keyed(key,
//! agent_id))`, with the key derived from `TMWS_SECRET_KEY`. Optional in
//! development, required in production.

use tmws_core::{Result, TmwsError};

fn derive_key(secret: &str) -> [u8; 32] {
    *blake3::hash(secret.as_bytes()).as_bytes()
}

/// Mint a token asserting `agent_id`.
pub fn make_token(secret: &str, agent_id: &str) -> String {
    let mac = blake3::keyed_hash(&derive_key(secret), agent_id.as_bytes());
    format!("{agent_id}:{}", mac.to_hex())
}

/// Verify a token, returning the asserted agent id.
pub fn verify_token(secret: &str, token: &str) -> Result<String> {
    let (agent_id, mac_hex) = token
        .rsplit_once(':')
        .ok_or_else(|| TmwsError::Permission("malformed session token".into()))?;
    tmws_validate::validate_agent_id(agent_id)
        .map_err(|_| TmwsError::Permission("token asserts an invalid agent id".into()))?;

    let expected = blake3::keyed_hash(&derive_key(secret), agent_id.as_bytes());
    let provided = match blake3::Hash::from_hex(mac_hex) {
        Ok(h) => h,
        Err(_) => return Err(TmwsError::Permission("malformed session token".into())),
    };
    // blake3::Hash equality is constant-time.
    if provided != expected {
        return Err(TmwsError::Permission("session token signature mismatch".into()));
    }
    Ok(agent_id.to_string())
}
