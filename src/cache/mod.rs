//! Named cache stores for intercepted responses
//!
//! A `CacheStorage` holds any number of named stores, each mapping a request
//! key to a response snapshot. The proxy keeps a versioned shell-asset store
//! and a long-lived API-response store side by side. Backends are in memory
//! (`MemoryStorage`) or on disk (`DiskStorage`).

mod disk;
mod storage;

pub use disk::DiskStorage;
pub use storage::{CacheError, CacheStorage, MemoryStorage};
