//! Troupe — multi-agent orchestration and conversation state engine.
//!
//! A session routes user turns through a roster of named agents. Agents
//! stream their replies through a provider-agnostic gateway, hand the
//! conversation off to each other, and call tools through an approval gate.
//! The conversation lives in an append-only store with rollback and
//! consolidation; long-term facts live in a pluggable memory store.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use troupe::prelude::*;
//!
//! # async fn example() -> troupe::error::Result<()> {
//! let mut agents = AgentRegistry::new();
//! agents.register(AgentDefinition::new("writer", "You are a concise writer."));
//!
//! let session = Session::new(
//!     TroupeConfig::new("writer"),
//!     Arc::new(agents),
//!     Arc::new(ToolRegistry::new()),
//!     ApprovalPolicy::new(),
//!     Arc::new(ScriptedGateway::new()),
//!     Arc::new(KeywordMemoryStore::new()),
//! )?;
//! let report = session.send_user("Hello!").await?;
//! println!("{}", report.reply);
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod gate;
pub mod memory;
pub mod prelude;
pub mod provider;
pub mod store;
pub mod tools;
pub mod types;
pub mod util;
