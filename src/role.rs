//! Role normalization for free-text class labels
//!
//! Joining players submit whatever class or role label their client carries.
//! Matching only needs the coarse category, so everything funnels through
//! `normalize` before an entry is created. The function is total: unknown and
//! empty labels fall through to dps.

use crate::types::Role;

/// Class labels that fill the tank slot
const TANK_LABELS: &[&str] = &["warrior", "paladin", "guardian", "knight", "sentinel"];

/// Class labels that fill the healer slot
const HEALER_LABELS: &[&str] = &["cleric", "priest", "druid", "oracle", "mender"];

/// Map a free-text class/role label to its coarse category.
///
/// Case-insensitive; surrounding whitespace is ignored. Role is bookkeeping
/// only in this engine — it never gates group formation.
pub fn normalize(label: &str) -> Role {
    let label = label.trim().to_lowercase();

    if TANK_LABELS.contains(&label.as_str()) {
        Role::Tank
    } else if HEALER_LABELS.contains(&label.as_str()) {
        Role::Healer
    } else {
        Role::Dps
    }
}
