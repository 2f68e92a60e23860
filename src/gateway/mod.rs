//! Gateway: request payloads, the cache-consulting orchestrator, and the HTTP server.

pub mod operations;
pub mod orchestrator;
pub mod server;
