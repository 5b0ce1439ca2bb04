//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs exchanged between Conduit components: inbound
//! invocation payloads, run outcomes returned to callers, and build records
//! kept by the backing store.

pub mod build;
pub mod invocation;
pub mod run;
