//! # tmws-config
//!
//! Configuration for the TMWS server: the `TMWS_*` environment-variable
//! allowlist with production hardening checks, and the
//! `custom_agents.json` profile loader.

pub mod custom_agents;
pub mod schema;

pub use custom_agents::{load_custom_agents, load_from_path, CustomAgentEntry, CustomAgentsFile};
pub use schema::{ConfigWarning, Environment, TmwsConfig, WarningSeverity, MIN_SECRET_KEY_LEN};
