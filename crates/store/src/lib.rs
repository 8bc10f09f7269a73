//! Durable, tenant-scoped persistence of sessions, transcripts, responses,
//! and audit events, backed by embedded SQLite.
//!
//! Every mutating operation is a single statement or a transaction covering
//! a step together with its calls/results, so a step is either fully visible
//! or absent. The store enforces single-writer semantics per session by
//! checking the expected `step_index` inside the transaction.

mod schema;
mod store;

pub use store::TranscriptStore;
