//! Memory engine and store capability traits for recall.
//!
//! This crate defines the "ports" the infrastructure layer implements
//! (`Embedder`, `VectorIndex`, `TextLog`) and the `MemoryEngine` that
//! drives them. It depends only on `recall-types` -- never on
//! `recall-infra` or any database/IO crate.

pub mod memory;
pub mod retry;
