//! Core domain types
//!
//! This module contains the core domain structures used across Conduit services.
//! These types are shared between the engine (for execution), the server (for
//! persistence) and the CLI (for display).

pub mod auth;
pub mod breaker;
pub mod execution;
pub mod pipeline;
