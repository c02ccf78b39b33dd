//! Agent roster: name-keyed registry plus TOML roster loading.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::definition::AgentDefinition;
use crate::error::{Result, TroupeError};

/// Registry of configured agents, populated at startup.
///
/// Agents reference each other by name (handoff targets); the registry is
/// the single place those names resolve to definitions.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<AgentDefinition>>,
}

/// One `[[agents]]` entry in a roster file.
#[derive(Debug, Deserialize)]
struct RosterEntry {
    name: String,
    #[serde(default)]
    description: String,
    system_prompt: String,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    handoff_targets: Vec<String>,
    #[serde(default = "enabled_default")]
    enabled: bool,
}

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    agents: Vec<RosterEntry>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any previous one with the same name.
    pub fn register(&mut self, definition: AgentDefinition) {
        self.agents
            .insert(definition.name.clone(), Arc::new(definition));
    }

    pub fn get(&self, name: &str) -> Option<Arc<AgentDefinition>> {
        self.agents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Registered agent names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    /// `(name, description)` of every agent `agent` may hand off to, sorted
    /// by name for stable prompt rendering.
    pub fn peers_visible_to(&self, agent: &AgentDefinition) -> Vec<(String, String)> {
        let mut peers: Vec<(String, String)> = self
            .agents
            .values()
            .filter(|peer| agent.may_hand_off_to(&peer.name))
            .map(|peer| (peer.name.clone(), peer.description.clone()))
            .collect();
        peers.sort();
        peers
    }

    /// Parse a TOML roster.
    ///
    /// Entries with `enabled = false` are skipped. Duplicate enabled names
    /// are a configuration error, not a silent override.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let roster: RosterFile = toml::from_str(text)
            .map_err(|err| TroupeError::Configuration(format!("invalid agent roster: {err}")))?;

        let mut registry = Self::new();
        for entry in roster.agents {
            if !entry.enabled {
                tracing::debug!(agent = %entry.name, "skipping disabled agent");
                continue;
            }
            if registry.contains(&entry.name) {
                return Err(TroupeError::Configuration(format!(
                    "duplicate agent '{}' in roster",
                    entry.name
                )));
            }
            registry.register(AgentDefinition {
                name: entry.name,
                description: entry.description,
                system_prompt: entry.system_prompt,
                tools: entry.tools,
                handoff_targets: entry.handoff_targets,
            });
        }
        Ok(registry)
    }

    /// Load a TOML roster from disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const ROSTER: &str = r#"
        [[agents]]
        name = "writer"
        description = "Writes prose"
        system_prompt = "You are a writer."

        [[agents]]
        name = "researcher"
        description = "Finds facts"
        system_prompt = "You are a researcher."
        tools = ["web_search"]
        handoff_targets = ["writer"]

        [[agents]]
        name = "retired"
        system_prompt = "Unused."
        enabled = false
    "#;

    #[test]
    fn parses_roster_and_skips_disabled() {
        let registry = AgentRegistry::from_toml_str(ROSTER).unwrap();
        assert_eq!(registry.names(), ["researcher", "writer"]);
        assert!(!registry.contains("retired"));

        let researcher = registry.get("researcher").unwrap();
        assert_eq!(researcher.tools, ["web_search"]);
        assert_eq!(researcher.handoff_targets, ["writer"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let toml = r#"
            [[agents]]
            name = "writer"
            system_prompt = "a"

            [[agents]]
            name = "writer"
            system_prompt = "b"
        "#;
        let err = AgentRegistry::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, TroupeError::Configuration(_)));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn invalid_toml_is_a_configuration_error() {
        let err = AgentRegistry::from_toml_str("[[agents]]\nname = ").unwrap_err();
        assert!(matches!(err, TroupeError::Configuration(_)));
    }

    #[test]
    fn missing_prompt_is_a_configuration_error() {
        let err = AgentRegistry::from_toml_str("[[agents]]\nname = \"x\"").unwrap_err();
        assert!(matches!(err, TroupeError::Configuration(_)));
    }

    #[test]
    fn loads_roster_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ROSTER.as_bytes()).unwrap();
        let registry = AgentRegistry::from_toml_file(file.path()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn peers_respect_handoff_targets() {
        let registry = AgentRegistry::from_toml_str(ROSTER).unwrap();
        let researcher = registry.get("researcher").unwrap();
        let peers = registry.peers_visible_to(&researcher);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].0, "writer");

        // Writer has no explicit targets, so everyone else is visible.
        let writer = registry.get("writer").unwrap();
        let peers = registry.peers_visible_to(&writer);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].0, "researcher");
    }
}
