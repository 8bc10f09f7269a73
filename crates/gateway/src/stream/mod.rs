//! The streaming assembler: renders engine events as client-facing wire
//! dialects while guaranteeing tool-intent lines never leak.

mod lookahead;

pub use lookahead::IntentGuard;
