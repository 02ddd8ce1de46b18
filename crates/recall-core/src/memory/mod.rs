//! Long-term memory: capability traits for the embedding generator and the
//! two stores, and the engine that keeps the stores in step.

pub mod embedder;
pub mod engine;
pub mod text_log;
pub mod vector;
