//! LanceDB-backed vector index. The Arrow schema defines the collection layout.

pub mod lance;
pub mod schema;

pub use lance::LanceVectorIndex;
