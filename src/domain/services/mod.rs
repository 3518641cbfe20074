//! Domain services
//!
//! Stateless logic over the catalog and opened handles.

mod copy_engine;
mod resolver;

pub use copy_engine::{CopyEngine, DEFAULT_CHUNK_SIZE, GIGABYTE};
pub use resolver::{Resolver, Target};
