//! Conduit Registry - shared, statically-defined tool and persona catalogs.
//!
//! This crate is the single source of truth for two kinds of static data:
//! - **Tools**: the `{id, name, description, category, input_schema,
//!   annotations}` definitions handed to the LLM's function-calling API.
//! - **Personas**: planner-selectable system prompt + tool scope + model
//!   tier bundles.
//!
//! Both are compile-time constants, not database rows; nothing here talks
//! to a database or network.

pub mod personas;
pub mod tools;

pub use personas::{default_personas, get_persona, ModelTier, PersonaConfig};
pub use tools::{default_tools, sanitize_tool_name, unsanitize_tool_name, ToolAnnotations, ToolDefinition};
