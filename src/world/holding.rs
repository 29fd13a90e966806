use crate::world::host::{Difficulty, Host, WorldRules, WorldSpec};
use std::sync::{Mutex, PoisonError};

/// Noon, so the area is always lit.
pub const HOLDING_TIME_OF_DAY: u32 = 6_000;

/// Handle to a materialised holding world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldHandle {
    pub name: String,
}

/// Lazily provisions the isolated world away entities are parked in.
///
/// The world is created at most once per name for the life of the process;
/// later calls only confirm the host still has it loaded.
#[derive(Debug, Default)]
pub struct HoldingArea {
    current: Mutex<Option<WorldHandle>>,
}

pub fn holding_world_spec(name: &str) -> WorldSpec {
    WorldSpec {
        name: name.to_string(),
        flat: true,
        generate_structures: false,
        empty_terrain: true,
        rules: WorldRules {
            mob_spawning: false,
            daylight_cycle: false,
            weather_cycle: false,
            fire_spread: false,
            random_tick_speed: 0,
            fall_damage: false,
            announce_advancements: false,
            immediate_respawn: true,
        },
        time_of_day: HOLDING_TIME_OF_DAY,
        storm: false,
        difficulty: Difficulty::Peaceful,
    }
}

impl HoldingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named world, creating it first if the host lacks it.
    /// `None` means relocation is unavailable right now.
    pub fn ensure<H: Host + ?Sized>(&self, host: &H, name: &str) -> Option<WorldHandle> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = current.as_ref() {
            if handle.name == name && host.world_loaded(name) {
                return Some(handle.clone());
            }
        }
        if host.world_loaded(name) {
            tracing::info!("holding area loaded: {}", name);
        } else {
            tracing::info!("creating holding area: {}", name);
            if let Err(err) = host.create_world(&holding_world_spec(name)) {
                tracing::error!("holding area '{}' creation failed: {}", name, err);
                *current = None;
                return None;
            }
            if !host.world_loaded(name) {
                tracing::error!("holding area '{}' missing after creation", name);
                *current = None;
                return None;
            }
            tracing::info!("holding area created: {}", name);
        }
        let handle = WorldHandle {
            name: name.to_string(),
        };
        *current = Some(handle.clone());
        Some(handle)
    }

    pub fn current(&self) -> Option<WorldHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
