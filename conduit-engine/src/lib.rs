//! Conduit Engine
//!
//! Runs customer-defined delivery pipelines against external tools.
//!
//! Architecture:
//! - Parser: definition text into a typed node/stage graph
//! - Resolver: per-stage authentication from embedded, referenced or
//!   connector/environment sources
//! - Resilience: retry with backoff inside per-dependency circuit breakers
//! - Dispatcher: skip rules, approval gating and typed stage handlers
//! - Orchestrator: graph traversal and run status for both invocation shapes
//!
//! Collaborators (credential store, build records) sit behind the traits in
//! [`repository`]; external tools sit behind the traits in [`tools`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod repository;
pub mod resilience;
pub mod resolver;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use orchestrator::Orchestrator;
