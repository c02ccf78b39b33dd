//! Name-keyed registry of tool implementations.

use std::collections::HashMap;
use std::sync::Arc;

use super::tool::Tool;
use super::types::ToolDescriptor;

/// Registry of concrete tools, populated at startup.
///
/// Agents reference tools by name; the registry is the single place those
/// names resolve to implementations.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors for the named subset, in the order given. Names with no
    /// registered implementation are skipped.
    pub fn descriptors_for(&self, names: &[String]) -> Vec<ToolDescriptor> {
        names
            .iter()
            .filter_map(|name| self.tools.get(name).map(|t| t.descriptor()))
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool::FnTool;
    use crate::tools::types::ToolParameters;

    fn noop(name: &str) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(name, "noop", ToolParameters::empty(), |_| async {
            Ok(serde_json::Value::Null)
        }))
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(noop("web_search"));
        assert!(registry.contains("web_search"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn descriptors_preserve_requested_order_and_skip_unknown() {
        let mut registry = ToolRegistry::new();
        registry.register(noop("b"));
        registry.register(noop("a"));

        let descriptors =
            registry.descriptors_for(&["a".to_string(), "missing".to_string(), "b".to_string()]);
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(noop("echo"));
        registry.register(Arc::new(FnTool::new(
            "echo",
            "second",
            ToolParameters::empty(),
            |_| async { Ok(serde_json::Value::Null) },
        )));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").unwrap().description(), "second");
    }
}
