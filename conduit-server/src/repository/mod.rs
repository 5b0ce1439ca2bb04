//! Repository Module
//!
//! Data access layer for the server.
//! Each repository handles database operations for a specific table.

pub mod build;
pub mod execution;

// Re-export for convenience
pub use build as build_repository;
pub use execution as execution_repository;
