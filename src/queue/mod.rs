//! Queue entry storage

pub mod store;

pub use store::{InMemoryQueueStore, QueueStore};
