//! Conduit Core
//!
//! Core types and abstractions for the Conduit pipeline execution engine.
//!
//! This crate contains:
//! - Domain types: pipeline graph, authentication records, execution state
//! - DTOs: invocation payloads, run outcomes and build records exchanged
//!   between the server, the engine and the CLI

pub mod domain;
pub mod dto;
