//! Shared domain types for recall.
//!
//! This crate contains the types passed between the memory engine and its
//! stores: memory records, search hits, pipeline reports, configuration,
//! and the error enums.
//!
//! Zero infrastructure dependencies -- only serde and thiserror.

pub mod config;
pub mod error;
pub mod memory;
