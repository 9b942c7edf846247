//! Server selection policy
//!
//! Deterministic choice of one streaming server for a requested variant,
//! with name continuity across variant switches and a configurable
//! fallback when no server carries the requested variant at all.

use serde::{Deserialize, Serialize};

use crate::models::{Server, Variant};

/// Behavior when no server matches the requested variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Fall back to the first server of any variant, flagged as degraded
    #[default]
    AnyVariant,
    /// Treat a variant with no servers as having nothing to play
    Strict,
}

/// Selection inputs that stay fixed across a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    /// Server name to prefer when present under the requested variant
    pub preferred_server: String,
    pub fallback: FallbackPolicy,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            preferred_server: "HD-1".to_string(),
            fallback: FallbackPolicy::default(),
        }
    }
}

/// One selected server, addressed by its position in the fetched list
#[derive(Debug, Clone, PartialEq)]
pub struct ServerChoice {
    pub index: usize,
    pub server: Server,
    /// Variant the caller asked for, which the chosen server may not carry
    pub requested: Variant,
}

impl ServerChoice {
    /// False only for the degraded cross-variant fallback
    pub fn matches_variant(&self) -> bool {
        self.server.variant == self.requested
    }
}

/// Pick the server to stream from, in order:
///
/// 1. the previously selected server's name, if it exists under `variant`
/// 2. the policy's preferred server name under `variant`
/// 3. the first server under `variant`, in fetch order
/// 4. per `FallbackPolicy`: the first server of any variant (degraded), or
///    nothing
///
/// Returns `None` for an empty list, and under `Strict` when no server
/// carries the requested variant. No side effects, no I/O.
pub fn select(
    servers: &[Server],
    variant: Variant,
    previous_server_name: Option<&str>,
    policy: &SelectionPolicy,
) -> Option<ServerChoice> {
    if servers.is_empty() {
        return None;
    }

    let under_variant = |name: &str| {
        servers
            .iter()
            .position(|s| s.variant == variant && s.name == name)
    };

    let index = previous_server_name
        .and_then(under_variant)
        .or_else(|| under_variant(&policy.preferred_server))
        .or_else(|| servers.iter().position(|s| s.variant == variant));

    let index = match (index, policy.fallback) {
        (Some(i), _) => i,
        (None, FallbackPolicy::AnyVariant) => 0,
        (None, FallbackPolicy::Strict) => return None,
    };

    Some(ServerChoice {
        index,
        server: servers[index].clone(),
        requested: variant,
    })
}
