//! SQLite storage layer: the text log, backed by split read/write pools in
//! WAL mode.

pub mod pool;
pub mod text_log;

pub use text_log::SqliteTextLog;
