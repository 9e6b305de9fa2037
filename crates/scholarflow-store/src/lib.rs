//! Key/value storage backends.
//!
//! Provides:
//! - `MemoryStore` - process-local map (feature: memory)
//! - `FileStore` - one JSON file per key with a background writer (feature: file)
//! - `NoopStore` - fallback when no durable storage is available

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file")]
pub mod file;

pub mod noop;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;

#[cfg(feature = "file")]
pub use file::FileStore;

pub use noop::NoopStore;
