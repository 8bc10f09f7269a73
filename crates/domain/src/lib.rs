//! Shared domain types for the RANTS gateway.
//!
//! Everything that crosses a crate boundary lives here: the error taxonomy,
//! message and tool-call shapes, session/transcript records, the external
//! response object, stream event types, and the configuration schema.

pub mod config;
pub mod error;
pub mod message;
pub mod response;
pub mod session;
pub mod stream;
