//! Capability — `(serverName, kind, name/uri, payload)` (spec §3).

use serde::{Deserialize, Serialize};

/// The namespace separator used to prefix upstream capability names in the
/// unified endpoint. Fixed; server names must not contain it.
pub const NAMESPACE_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Resource,
    ResourceTemplate,
    Prompt,
}

/// A single capability discovered on one upstream server. `raw` preserves
/// the upstream's JSON payload bit-exactly for round-trip fidelity through
/// the aggregator (see spec §9 "Dynamic typing for capabilities").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub server_name: String,
    pub kind: CapabilityKind,
    /// Tool/prompt name, or resource URI.
    pub name: String,
    pub raw: serde_json::Value,
}

impl Capability {
    pub fn new(
        server_name: impl Into<String>,
        kind: CapabilityKind,
        name: impl Into<String>,
        raw: serde_json::Value,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            kind,
            name: name.into(),
            raw,
        }
    }

    /// The namespaced key exposed by the unified upstream endpoint, e.g.
    /// `"github__search_code"`. Only meaningful for tools and prompts;
    /// resources are passed through by URI (spec §4.6).
    pub fn qualified_name(&self) -> String {
        format!("{}{}{}", self.server_name, NAMESPACE_SEPARATOR, self.name)
    }
}

/// Split a qualified name back into `(server_name, capability_name)`.
/// The left side of the *first* separator occurrence selects the server;
/// the remainder is the upstream name (spec §4.6, §8 "Namespace round-trip").
pub fn split_qualified_name(qualified: &str) -> Option<(&str, &str)> {
    qualified.split_once(NAMESPACE_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_round_trip() {
        let cap = Capability::new(
            "github",
            CapabilityKind::Tool,
            "search_code",
            serde_json::json!({}),
        );
        let qualified = cap.qualified_name();
        assert_eq!(qualified, "github__search_code");
        assert_eq!(
            split_qualified_name(&qualified),
            Some(("github", "search_code"))
        );
    }

    #[test]
    fn split_missing_separator() {
        assert_eq!(split_qualified_name("no_separator_here"), None);
    }
}
