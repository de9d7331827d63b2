//! Runner profile bindings
//!
//! Profiles are advisory: the cascade resolver consults them when
//! filtering fallback positions, and the command adapter uses them to
//! construct subprocess invocations. Runner construction itself stays
//! with the caller.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Named binding of a runner to its provider family and model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerProfile {
    /// Provider family / agent binary ("claude", "codex", ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Model identifier passed to the agent
    pub model: String,

    /// Named agent-side profile, when the CLI supports one
    pub profile: Option<String>,

    /// Extra environment for the agent process
    pub env: HashMap<String, String>,

    /// Provider trains on session data; unsafe for private repositories
    #[serde(rename = "data-collection")]
    pub data_collection: bool,

    /// Free-tier binding
    pub free: bool,
}
