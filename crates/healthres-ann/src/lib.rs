//! healthres-ann
//!
//! In-process approximate nearest-neighbour index over the corpus embeddings,
//! with optional persistence to a single binary file.

pub mod index;
mod persist;

pub use index::{AnnConfig, AnnIndex, Neighbor};
