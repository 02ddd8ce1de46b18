//! External embedding generator: the child process that serves embeddings
//! over HTTP and the client that drives it.

pub mod client;
pub mod process;

pub use client::HttpEmbeddingClient;
pub use process::EmbeddingProcess;
