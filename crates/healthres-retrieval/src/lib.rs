//! healthres-retrieval
//!
//! Query-time facade over the local ANN index and the remote vector store, and
//! the session object that builds both exactly once.

pub mod backend;
pub mod retriever;
pub mod session;

pub use backend::{rank, LocalBackend, RemoteBackend};
pub use retriever::Retriever;
pub use session::{Phase, Session};
