//! Instance catalog traits and implementations
//!
//! This module defines the interface for looking up instance definitions and
//! computing which instances a candidate group is eligible for, along with the
//! static built-in catalog.

use crate::error::{MatchmakingError, Result};
use crate::types::{InstanceKindId, QueueKind};
use crate::utils::mean;
use serde::{Deserialize, Serialize};

/// One stage of an instance, snapshotted onto created instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    /// Final stage of most instances; drives reward logic downstream
    pub boss: bool,
}

impl StageDefinition {
    pub fn new(name: &str, boss: bool) -> Self {
        Self {
            name: name.to_string(),
            boss,
        }
    }
}

/// Definition of a dungeon or raid kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDefinition {
    pub id: InstanceKindId,
    pub name: String,
    pub kind: QueueKind,
    /// Minimum party size to launch
    pub min_players: usize,
    /// Roster cap; fill-seeking parties grow toward this
    pub max_players: usize,
    /// Mean group level must meet this threshold
    pub level_requirement: u32,
    /// Mean group item score must meet this threshold
    pub item_score_requirement: u32,
    pub stages: Vec<StageDefinition>,
}

impl InstanceDefinition {
    /// Whether a group of `size` players may launch this instance
    pub fn accepts_group_size(&self, size: usize) -> bool {
        size >= self.min_players && size <= self.max_players
    }
}

/// Aggregate stats of a candidate group, used for eligibility checks
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupProfile {
    pub mean_level: f64,
    pub mean_item_score: f64,
}

impl GroupProfile {
    /// Build a profile from per-member (level, item_score) pairs
    pub fn from_members(members: &[(u32, u32)]) -> Self {
        Self {
            mean_level: mean(members.iter().map(|(level, _)| *level)),
            mean_item_score: mean(members.iter().map(|(_, score)| *score)),
        }
    }

    fn meets(&self, definition: &InstanceDefinition) -> bool {
        self.mean_level >= definition.level_requirement as f64
            && self.mean_item_score >= definition.item_score_requirement as f64
    }
}

/// Trait for looking up instance definitions and group eligibility
pub trait EligibilityCatalog: Send + Sync {
    /// Look up a definition by its kind id
    fn instance_by_id(&self, id: &str) -> Result<InstanceDefinition>;

    /// All definitions the given group profile is eligible for
    fn eligible_for_group(&self, profile: GroupProfile) -> Vec<InstanceDefinition>;

    /// Kind id of the designated launch instance, preferred when eligible
    fn launch_instance_id(&self) -> &str;

    /// All known definitions
    fn all_definitions(&self) -> Vec<InstanceDefinition>;
}

/// Kind id of the initially enabled dungeon
pub const LAUNCH_INSTANCE_ID: &str = "emberfall-depths";

/// Static catalog with the built-in instance definitions
///
/// Only one instance kind is currently routed to by default matching (the
/// launch dungeon), but eligibility is always computed across the full set so
/// new definitions slot in without engine changes.
#[derive(Debug, Clone)]
pub struct StaticInstanceCatalog {
    definitions: Vec<InstanceDefinition>,
    launch_id: InstanceKindId,
}

impl StaticInstanceCatalog {
    /// Create the catalog with built-in definitions
    pub fn new() -> Self {
        Self {
            definitions: Self::builtin_definitions(),
            launch_id: LAUNCH_INSTANCE_ID.to_string(),
        }
    }

    /// Create a catalog with custom definitions, for tests and tooling
    pub fn with_definitions(
        definitions: Vec<InstanceDefinition>,
        launch_id: &str,
    ) -> Result<Self> {
        let catalog = Self {
            definitions,
            launch_id: launch_id.to_string(),
        };
        catalog.validate()?;
        Ok(catalog)
    }

    fn builtin_definitions() -> Vec<InstanceDefinition> {
        vec![
            InstanceDefinition {
                id: LAUNCH_INSTANCE_ID.to_string(),
                name: "Emberfall Depths".to_string(),
                kind: QueueKind::Dungeon,
                min_players: 2,
                max_players: 5,
                level_requirement: 3,
                item_score_requirement: 10,
                stages: vec![
                    StageDefinition::new("Cinder Gate", false),
                    StageDefinition::new("Ashen Vault", false),
                    StageDefinition::new("The Molten Throne", true),
                ],
            },
            InstanceDefinition {
                id: "gloomroot-hollow".to_string(),
                name: "Gloomroot Hollow".to_string(),
                kind: QueueKind::Dungeon,
                min_players: 2,
                max_players: 5,
                level_requirement: 8,
                item_score_requirement: 40,
                stages: vec![
                    StageDefinition::new("Tangled Descent", false),
                    StageDefinition::new("Sporefather's Den", true),
                ],
            },
            InstanceDefinition {
                id: "obsidian-sanctum".to_string(),
                name: "Obsidian Sanctum".to_string(),
                kind: QueueKind::Raid,
                min_players: 5,
                max_players: 10,
                level_requirement: 15,
                item_score_requirement: 120,
                stages: vec![
                    StageDefinition::new("Shattered Causeway", false),
                    StageDefinition::new("Hall of Mirrors", false),
                    StageDefinition::new("The Obsidian Court", false),
                    StageDefinition::new("Voidglass Tyrant", true),
                ],
            },
        ]
    }

    fn validate(&self) -> Result<()> {
        for definition in &self.definitions {
            if definition.min_players == 0 {
                return Err(MatchmakingError::ConfigurationError {
                    message: format!("{}: min_players must be greater than 0", definition.id),
                }
                .into());
            }
            if definition.min_players > definition.max_players {
                return Err(MatchmakingError::ConfigurationError {
                    message: format!(
                        "{}: min_players cannot exceed max_players",
                        definition.id
                    ),
                }
                .into());
            }
            if definition.stages.is_empty() {
                return Err(MatchmakingError::ConfigurationError {
                    message: format!("{}: at least one stage is required", definition.id),
                }
                .into());
            }
        }

        if !self.definitions.iter().any(|d| d.id == self.launch_id) {
            return Err(MatchmakingError::ConfigurationError {
                message: format!("launch instance {} is not in the catalog", self.launch_id),
            }
            .into());
        }

        Ok(())
    }
}

impl Default for StaticInstanceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl EligibilityCatalog for StaticInstanceCatalog {
    fn instance_by_id(&self, id: &str) -> Result<InstanceDefinition> {
        self.definitions
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| {
                MatchmakingError::UnknownInstanceKind {
                    kind_id: id.to_string(),
                }
                .into()
            })
    }

    fn eligible_for_group(&self, profile: GroupProfile) -> Vec<InstanceDefinition> {
        self.definitions
            .iter()
            .filter(|d| profile.meets(d))
            .cloned()
            .collect()
    }

    fn launch_instance_id(&self) -> &str {
        &self.launch_id
    }

    fn all_definitions(&self) -> Vec<InstanceDefinition> {
        self.definitions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_contains_launch_instance() {
        let catalog = StaticInstanceCatalog::new();
        let launch = catalog.instance_by_id(LAUNCH_INSTANCE_ID).unwrap();

        assert_eq!(launch.kind, QueueKind::Dungeon);
        assert_eq!(launch.min_players, 2);
        assert_eq!(launch.max_players, 5);
        assert!(launch.stages.last().unwrap().boss);
    }

    #[test]
    fn test_unknown_instance_kind() {
        let catalog = StaticInstanceCatalog::new();
        assert!(catalog.instance_by_id("no-such-dungeon").is_err());
    }

    #[test]
    fn test_eligibility_uses_mean_stats() {
        let catalog = StaticInstanceCatalog::new();

        // Mean level 5, mean item score 20: launch dungeon only.
        let profile = GroupProfile::from_members(&[(4, 15), (6, 25)]);
        let eligible = catalog.eligible_for_group(profile);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, LAUNCH_INSTANCE_ID);

        // A seasoned group is eligible for everything.
        let profile = GroupProfile::from_members(&[(30, 200), (32, 220)]);
        let eligible = catalog.eligible_for_group(profile);
        assert_eq!(eligible.len(), 3);
    }

    #[test]
    fn test_underleveled_group_is_eligible_for_nothing() {
        let catalog = StaticInstanceCatalog::new();
        let profile = GroupProfile::from_members(&[(1, 1), (2, 2)]);
        assert!(catalog.eligible_for_group(profile).is_empty());
    }

    #[test]
    fn test_group_size_bounds() {
        let catalog = StaticInstanceCatalog::new();
        let launch = catalog.instance_by_id(LAUNCH_INSTANCE_ID).unwrap();

        assert!(!launch.accepts_group_size(1));
        assert!(launch.accepts_group_size(2));
        assert!(launch.accepts_group_size(5));
        assert!(!launch.accepts_group_size(6));
    }

    #[test]
    fn test_custom_catalog_validation() {
        let bad = vec![InstanceDefinition {
            id: "broken".to_string(),
            name: "Broken".to_string(),
            kind: QueueKind::Dungeon,
            min_players: 6,
            max_players: 5,
            level_requirement: 1,
            item_score_requirement: 1,
            stages: vec![StageDefinition::new("Only", true)],
        }];
        assert!(StaticInstanceCatalog::with_definitions(bad, "broken").is_err());

        let missing_launch = StaticInstanceCatalog::builtin_definitions();
        assert!(StaticInstanceCatalog::with_definitions(missing_launch, "absent").is_err());
    }
}
