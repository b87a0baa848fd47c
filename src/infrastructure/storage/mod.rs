//! Storage implementations that live outside a database

mod memory;

pub use memory::{InMemoryStore, MemoryTransaction, DEFAULT_MAX_CONCURRENT_TRANSACTIONS};
