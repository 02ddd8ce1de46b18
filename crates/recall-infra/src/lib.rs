//! Infrastructure layer for recall.
//!
//! Implements the capability traits defined in `recall-core`: the HTTP
//! embedding client and its supervised service process, the LanceDB vector
//! index, and the SQLite text log. Also loads configuration.

pub mod config;
pub mod embedding;
pub mod sqlite;
pub mod vector;
