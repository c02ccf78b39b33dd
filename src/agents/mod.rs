//! Agents: definitions, the roster, and the session driver.

pub mod definition;
pub mod registry;
pub mod session;

pub use definition::AgentDefinition;
pub use registry::AgentRegistry;
pub use session::{Session, TurnReport};
