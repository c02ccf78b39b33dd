//! Agent definitions: named personas with prompts, tools and handoff rules.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One configured agent. Immutable once registered for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDefinition {
    pub name: String,
    /// Capability description shown to peer agents when they decide whether
    /// to hand off.
    #[serde(default)]
    pub description: String,
    /// System prompt template. `{current_date}` is substituted at dispatch
    /// time; the peer roster is appended below it.
    pub system_prompt: String,
    /// Ordered list of permitted tool names.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Agents this one may hand off to. Empty means any registered agent.
    #[serde(default)]
    pub handoff_targets: Vec<String>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            handoff_targets: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_handoff_targets(mut self, targets: Vec<String>) -> Self {
        self.handoff_targets = targets;
        self
    }

    pub fn permits_tool(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|t| t == tool_name)
    }

    /// Whether a handoff directive to `target` is allowed by this agent's
    /// rules. Handing off to yourself never is.
    pub fn may_hand_off_to(&self, target: &str) -> bool {
        if target == self.name {
            return false;
        }
        self.handoff_targets.is_empty() || self.handoff_targets.iter().any(|t| t == target)
    }

    /// Resolve the system prompt for one dispatch.
    ///
    /// Substitutes `{current_date}` and `{agents}` (the peer roster). When
    /// the template has no `{agents}` placeholder and peers are reachable,
    /// a roster section is appended instead, telling the agent whom it can
    /// hand off to and how.
    pub fn render_system_prompt(&self, peers: &[(String, String)]) -> String {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let mut prompt = self.system_prompt.replace("{current_date}", &date);

        let mut roster = String::new();
        for (name, description) in peers {
            if description.is_empty() {
                roster.push_str(&format!("- {name}\n"));
            } else {
                roster.push_str(&format!("- {name}: {description}\n"));
            }
        }

        if prompt.contains("{agents}") {
            prompt = prompt.replace("{agents}", roster.trim_end());
        } else if !peers.is_empty() {
            prompt.push_str(
                "\n\n## Agents available for handoff\n\
                 You are one specialist in a multi-agent system. When another \
                 agent is better suited to the task, call the `handoff` tool \
                 with the target agent's name and a precise, actionable task \
                 description.\n",
            );
            prompt.push_str(&roster);
        }
        prompt
    }
}
