//! Capabilities the hosting simulation hands to the AFK engine.
//!
//! The engine never reaches into a concrete server API. Everything it needs
//! to observe or change about an entity or a world goes through [`Host`],
//! and block lookups for position safety go through the narrower
//! [`BlockView`].

use crate::error::HostError;
use crate::world::position::{BlockPos, Location};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identity of a participant across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Air,
    Solid,
    Liquid,
    Lava,
    Fire,
}

impl BlockKind {
    pub fn is_passable(self) -> bool {
        matches!(self, BlockKind::Air)
    }

    /// Something an entity can stand on without being hurt.
    pub fn is_safe_ground(self) -> bool {
        matches!(self, BlockKind::Solid)
    }
}

/// Health, hunger and saturation of an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vitals {
    pub health: f64,
    pub food: i32,
    pub saturation: f32,
}

/// Point-in-time view of the attributes the engine saves and restores.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub location: Location,
    pub flying: bool,
    pub allow_flight: bool,
    pub vitals: Vitals,
    pub max_health: f64,
    pub fall_distance: f32,
    pub in_vehicle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Peaceful,
    Easy,
    Normal,
    Hard,
}

/// Simulation rules applied to a provisioned world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldRules {
    pub mob_spawning: bool,
    pub daylight_cycle: bool,
    pub weather_cycle: bool,
    pub fire_spread: bool,
    pub random_tick_speed: u32,
    pub fall_damage: bool,
    pub announce_advancements: bool,
    pub immediate_respawn: bool,
}

/// Everything a host needs to materialise a named world.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSpec {
    pub name: String,
    pub flat: bool,
    pub generate_structures: bool,
    pub empty_terrain: bool,
    pub rules: WorldRules,
    pub time_of_day: u32,
    pub storm: bool,
    pub difficulty: Difficulty,
}

pub trait BlockView {
    /// `None` when the world is not loaded.
    fn block_at(&self, world: &str, pos: BlockPos) -> Option<BlockKind>;
}

pub trait Host: BlockView + Send + Sync {
    fn online_entities(&self) -> Vec<EntityId>;
    fn is_online(&self, id: EntityId) -> bool;
    fn display_name(&self, id: EntityId) -> Option<String>;
    fn snapshot(&self, id: EntityId) -> Result<EntitySnapshot, HostError>;
    fn has_permission(&self, id: EntityId, permission: &str) -> bool;

    fn world_loaded(&self, name: &str) -> bool;
    /// Spawn point of the default (first) world.
    fn default_spawn(&self) -> Option<Location>;
    fn create_world(&self, spec: &WorldSpec) -> Result<(), HostError>;

    fn teleport(&self, id: EntityId, to: &Location) -> Result<(), HostError>;
    fn set_flight(&self, id: EntityId, allow_flight: bool, flying: bool) -> Result<(), HostError>;
    fn set_vitals(&self, id: EntityId, vitals: Vitals) -> Result<(), HostError>;
    fn set_fall_distance(&self, id: EntityId, distance: f32) -> Result<(), HostError>;
    fn leave_vehicle(&self, id: EntityId) -> Result<(), HostError>;
    fn set_invulnerable(&self, id: EntityId, invulnerable: bool) -> Result<(), HostError>;
    /// `None` restores the plain name.
    fn set_list_name(&self, id: EntityId, name: Option<&str>) -> Result<(), HostError>;
    fn set_chunk_force_loaded(
        &self,
        world: &str,
        chunk: (i32, i32),
        loaded: bool,
    ) -> Result<(), HostError>;

    fn send_message(&self, id: EntityId, message: &str) -> Result<(), HostError>;
    fn disconnect(&self, id: EntityId, message: &str) -> Result<(), HostError>;
    fn broadcast(&self, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_parses_and_prints() {
        let text = "7f1c2a3e-0d4b-4f6a-9e8d-1a2b3c4d5e6f";
        let id: EntityId = text.parse().expect("parse");
        assert_eq!(id.to_string(), text);
        assert!("not-a-uuid".parse::<EntityId>().is_err());
    }

    #[test]
    fn only_solid_blocks_are_safe_ground() {
        assert!(BlockKind::Solid.is_safe_ground());
        for kind in [BlockKind::Air, BlockKind::Liquid, BlockKind::Lava, BlockKind::Fire] {
            assert!(!kind.is_safe_ground(), "{kind:?}");
        }
        assert!(BlockKind::Air.is_passable());
        assert!(!BlockKind::Fire.is_passable());
    }
}
