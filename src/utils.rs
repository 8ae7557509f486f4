//! Utility functions for the matchmaking service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique queue entry ID
pub fn generate_entry_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique instance ID
pub fn generate_instance_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique party ID
pub fn generate_party_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Arithmetic mean of a set of integer stats, zero for an empty set
pub fn mean(values: impl IntoIterator<Item = u32>) -> f64 {
    let mut sum = 0u64;
    let mut count = 0u64;
    for value in values {
        sum += value as u64;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}
