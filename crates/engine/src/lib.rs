//! The RANTS engine: generator prompt contract, tool compiler, and the
//! recursive session orchestrator.

mod compact;
mod compiler;
mod orchestrator;
mod prompt;

pub use compact::build_compact_context;
pub use compiler::ToolCompiler;
pub use orchestrator::{Orchestrator, SessionRequest, ShimOutcome};
pub use prompt::{build_system_prompt, parse_generator_output, TOOL_INTENT_PREFIX};
