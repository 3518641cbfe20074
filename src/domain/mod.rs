//! Domain layer - storage objects and the logic over them
//!
//! This module contains the storage entities, the catalog snapshot, the
//! repository traits for OS services and the domain services. It performs
//! no I/O of its own.

pub mod catalog;
pub mod entities;
pub mod repositories;
pub mod services;

pub use catalog::Catalog;
