//! Shared fixtures: a two-agent roster, a deterministic tool registry, and
//! session builders over any gateway.

#![allow(dead_code)]

use std::sync::Arc;

use troupe::prelude::*;

pub fn roster() -> Arc<AgentRegistry> {
    let mut agents = AgentRegistry::new();
    agents.register(
        AgentDefinition::new("writer", "You are a writer. Today is {current_date}.")
            .with_description("Turns findings into prose"),
    );
    agents.register(
        AgentDefinition::new("researcher", "You are a researcher.")
            .with_description("Finds facts")
            .with_tools(vec!["web_search".into()]),
    );
    Arc::new(agents)
}

pub fn tools() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FnTool::new(
        "web_search",
        "Search the web",
        ToolParameters::object()
            .string("query", "Search query", true)
            .build(),
        |args| async move { Ok(serde_json::json!({ "hits": [args["query"]] })) },
    )));
    Arc::new(registry)
}

pub fn session(gateway: Arc<dyn ProviderGateway>) -> Session {
    session_with_config(TroupeConfig::new("writer"), gateway)
}

pub fn session_with_config(config: TroupeConfig, gateway: Arc<dyn ProviderGateway>) -> Session {
    Session::new(
        config,
        roster(),
        tools(),
        ApprovalPolicy::new().allow("web_search"),
        gateway,
        Arc::new(KeywordMemoryStore::new()),
    )
    .expect("session construction")
}
