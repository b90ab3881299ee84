//! healthres-core
//!
//! Shared data model, error taxonomy, configuration and capability traits for
//! the research-abstract retrieval pipeline. Backends live in sibling crates.

pub mod config;
pub mod corpus;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
