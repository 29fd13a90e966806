//! In-memory host used by the console binary and the test suite.
//!
//! Worlds are flat columns: every block below the surface height is solid,
//! everything else is air, with optional per-block overrides. Mutations are
//! applied to the entity table and also journalled so callers can inspect
//! what the engine asked for.

use crate::error::HostError;
use crate::world::host::{
    BlockKind, BlockView, EntityId, EntitySnapshot, Host, Vitals, WorldSpec,
};
use crate::world::position::{BlockPos, Location};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_WORLD: &str = "world";
pub const DEFAULT_SURFACE: i32 = 64;
pub const MIN_HEIGHT: i32 = -64;

#[derive(Debug, Clone, PartialEq)]
pub struct SimEntity {
    pub name: String,
    pub online: bool,
    pub location: Location,
    pub flying: bool,
    pub allow_flight: bool,
    pub vitals: Vitals,
    pub max_health: f64,
    pub fall_distance: f32,
    pub in_vehicle: bool,
    pub invulnerable: bool,
    pub list_name: Option<String>,
    pub permissions: HashSet<String>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone)]
struct SimWorld {
    name: String,
    /// `None` for empty (void) worlds.
    surface: Option<i32>,
    overrides: HashMap<BlockPos, BlockKind>,
    spawn: Location,
}

impl SimWorld {
    fn flat(name: &str, surface: i32) -> Self {
        Self {
            name: name.to_string(),
            surface: Some(surface),
            overrides: HashMap::new(),
            spawn: Location::new(name, 0.5, f64::from(surface), 0.5),
        }
    }

    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            surface: None,
            overrides: HashMap::new(),
            spawn: Location::new(name, 0.5, 100.0, 0.5),
        }
    }

    fn block(&self, pos: BlockPos) -> BlockKind {
        if let Some(kind) = self.overrides.get(&pos) {
            return *kind;
        }
        match self.surface {
            Some(surface) if pos.y >= MIN_HEIGHT && pos.y < surface => BlockKind::Solid,
            _ => BlockKind::Air,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    worlds: Vec<SimWorld>,
    entities: HashMap<EntityId, SimEntity>,
    broadcasts: Vec<String>,
    teleports: Vec<(EntityId, Location)>,
    disconnects: Vec<(EntityId, String)>,
    created_worlds: Vec<String>,
    world_specs: Vec<WorldSpec>,
    force_loaded: HashSet<(String, (i32, i32))>,
    fail_world_creation: bool,
    blocked_worlds: HashSet<String>,
    rejected: HashSet<&'static str>,
}

impl SimState {
    fn world(&self, name: &str) -> Option<&SimWorld> {
        self.worlds.iter().find(|world| world.name == name)
    }

    fn check(&self, operation: &'static str) -> Result<(), HostError> {
        if self.rejected.contains(operation) {
            return Err(HostError::Rejected {
                operation,
                reason: "rejected by simulation".to_string(),
            });
        }
        Ok(())
    }

    fn online_mut(&mut self, id: EntityId) -> Result<&mut SimEntity, HostError> {
        match self.entities.get_mut(&id) {
            Some(entity) if entity.online => Ok(entity),
            _ => Err(HostError::Offline(id)),
        }
    }
}

#[derive(Debug)]
pub struct SimHost {
    state: Mutex<SimState>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    /// One flat default world with its surface at y=64.
    pub fn new() -> Self {
        let state = SimState {
            worlds: vec![SimWorld::flat(DEFAULT_WORLD, DEFAULT_SURFACE)],
            ..SimState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_flat_world(&self, name: &str, surface: i32) {
        let mut state = self.state();
        state.worlds.retain(|world| world.name != name);
        state.worlds.push(SimWorld::flat(name, surface));
    }

    pub fn unload_world(&self, name: &str) {
        self.state().worlds.retain(|world| world.name != name);
    }

    pub fn set_block(&self, world: &str, pos: BlockPos, kind: BlockKind) {
        let mut state = self.state();
        if let Some(world) = state.worlds.iter_mut().find(|w| w.name == world) {
            world.overrides.insert(pos, kind);
        }
    }

    /// Connects a new entity at the default spawn.
    pub fn join(&self, name: &str) -> EntityId {
        let id = EntityId::new_random();
        self.join_with_id(id, name);
        id
    }

    /// Connects (or reconnects) `id`, keeping its last location if known.
    pub fn join_with_id(&self, id: EntityId, name: &str) {
        let mut state = self.state();
        let spawn = state
            .worlds
            .first()
            .map(|world| world.spawn.clone())
            .unwrap_or_else(|| Location::new(DEFAULT_WORLD, 0.5, 64.0, 0.5));
        let entity = state.entities.entry(id).or_insert_with(|| SimEntity {
            name: name.to_string(),
            online: true,
            location: spawn,
            flying: false,
            allow_flight: false,
            vitals: Vitals {
                health: 20.0,
                food: 20,
                saturation: 5.0,
            },
            max_health: 20.0,
            fall_distance: 0.0,
            in_vehicle: false,
            invulnerable: false,
            list_name: None,
            permissions: HashSet::new(),
            messages: Vec::new(),
        });
        entity.online = true;
    }

    pub fn leave(&self, id: EntityId) {
        if let Some(entity) = self.state().entities.get_mut(&id) {
            entity.online = false;
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.state()
            .entities
            .iter()
            .find(|(_, entity)| entity.name.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }

    pub fn entity(&self, id: EntityId) -> Option<SimEntity> {
        self.state().entities.get(&id).cloned()
    }

    /// Moves an entity without going through the journal, as a client would.
    pub fn place(&self, id: EntityId, location: Location) {
        if let Some(entity) = self.state().entities.get_mut(&id) {
            entity.location = location;
        }
    }

    pub fn update_entity(&self, id: EntityId, update: impl FnOnce(&mut SimEntity)) {
        if let Some(entity) = self.state().entities.get_mut(&id) {
            update(entity);
        }
    }

    pub fn grant(&self, id: EntityId, permission: &str) {
        self.update_entity(id, |entity| {
            entity.permissions.insert(permission.to_string());
        });
    }

    pub fn fail_world_creation(&self, fail: bool) {
        self.state().fail_world_creation = fail;
    }

    /// Teleports into `world` are rejected while blocked.
    pub fn block_teleports_into(&self, world: &str, blocked: bool) {
        let mut state = self.state();
        if blocked {
            state.blocked_worlds.insert(world.to_string());
        } else {
            state.blocked_worlds.remove(world);
        }
    }

    /// Calls to `operation` ("set_list_name", "set_invulnerable" or
    /// "disconnect") fail while rejected.
    pub fn reject_operation(&self, operation: &'static str, rejected: bool) {
        let mut state = self.state();
        if rejected {
            state.rejected.insert(operation);
        } else {
            state.rejected.remove(operation);
        }
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.state().broadcasts.clone()
    }

    pub fn teleports(&self) -> Vec<(EntityId, Location)> {
        self.state().teleports.clone()
    }

    pub fn disconnects(&self) -> Vec<(EntityId, String)> {
        self.state().disconnects.clone()
    }

    pub fn messages(&self, id: EntityId) -> Vec<String> {
        self.state()
            .entities
            .get(&id)
            .map(|entity| entity.messages.clone())
            .unwrap_or_default()
    }

    pub fn created_worlds(&self) -> Vec<String> {
        self.state().created_worlds.clone()
    }

    pub fn world_specs(&self) -> Vec<WorldSpec> {
        self.state().world_specs.clone()
    }

    pub fn is_force_loaded(&self, world: &str, chunk: (i32, i32)) -> bool {
        self.state()
            .force_loaded
            .contains(&(world.to_string(), chunk))
    }
}

impl BlockView for SimHost {
    fn block_at(&self, world: &str, pos: BlockPos) -> Option<BlockKind> {
        self.state().world(world).map(|world| world.block(pos))
    }
}

impl Host for SimHost {
    fn online_entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .state()
            .entities
            .iter()
            .filter(|(_, entity)| entity.online)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    fn is_online(&self, id: EntityId) -> bool {
        self.state()
            .entities
            .get(&id)
            .map_or(false, |entity| entity.online)
    }

    fn display_name(&self, id: EntityId) -> Option<String> {
        self.state().entities.get(&id).map(|entity| entity.name.clone())
    }

    fn snapshot(&self, id: EntityId) -> Result<EntitySnapshot, HostError> {
        let mut state = self.state();
        let entity = state.online_mut(id)?;
        Ok(EntitySnapshot {
            location: entity.location.clone(),
            flying: entity.flying,
            allow_flight: entity.allow_flight,
            vitals: entity.vitals,
            max_health: entity.max_health,
            fall_distance: entity.fall_distance,
            in_vehicle: entity.in_vehicle,
        })
    }

    fn has_permission(&self, id: EntityId, permission: &str) -> bool {
        self.state()
            .entities
            .get(&id)
            .map_or(false, |entity| entity.permissions.contains(permission))
    }

    fn world_loaded(&self, name: &str) -> bool {
        self.state().world(name).is_some()
    }

    fn default_spawn(&self) -> Option<Location> {
        self.state().worlds.first().map(|world| world.spawn.clone())
    }

    fn create_world(&self, spec: &WorldSpec) -> Result<(), HostError> {
        let mut state = self.state();
        if state.fail_world_creation {
            return Err(HostError::Rejected {
                operation: "create_world",
                reason: "world creation disabled".to_string(),
            });
        }
        if state.world(&spec.name).is_none() {
            let world = if spec.empty_terrain {
                SimWorld::empty(&spec.name)
            } else {
                SimWorld::flat(&spec.name, DEFAULT_SURFACE)
            };
            state.worlds.push(world);
            state.created_worlds.push(spec.name.clone());
            state.world_specs.push(spec.clone());
        }
        Ok(())
    }

    fn teleport(&self, id: EntityId, to: &Location) -> Result<(), HostError> {
        let mut state = self.state();
        if state.world(&to.world).is_none() || state.blocked_worlds.contains(&to.world) {
            return Err(HostError::WorldUnavailable(to.world.clone()));
        }
        let entity = state.online_mut(id)?;
        entity.location = to.clone();
        entity.in_vehicle = false;
        state.teleports.push((id, to.clone()));
        Ok(())
    }

    fn set_flight(&self, id: EntityId, allow_flight: bool, flying: bool) -> Result<(), HostError> {
        let mut state = self.state();
        let entity = state.online_mut(id)?;
        entity.allow_flight = allow_flight;
        entity.flying = allow_flight && flying;
        Ok(())
    }

    fn set_vitals(&self, id: EntityId, vitals: Vitals) -> Result<(), HostError> {
        let mut state = self.state();
        let entity = state.online_mut(id)?;
        entity.vitals = Vitals {
            health: vitals.health.clamp(0.0, entity.max_health),
            ..vitals
        };
        Ok(())
    }

    fn set_fall_distance(&self, id: EntityId, distance: f32) -> Result<(), HostError> {
        let mut state = self.state();
        state.online_mut(id)?.fall_distance = distance;
        Ok(())
    }

    fn leave_vehicle(&self, id: EntityId) -> Result<(), HostError> {
        let mut state = self.state();
        state.online_mut(id)?.in_vehicle = false;
        Ok(())
    }

    fn set_invulnerable(&self, id: EntityId, invulnerable: bool) -> Result<(), HostError> {
        let mut state = self.state();
        state.check("set_invulnerable")?;
        state.online_mut(id)?.invulnerable = invulnerable;
        Ok(())
    }

    fn set_list_name(&self, id: EntityId, name: Option<&str>) -> Result<(), HostError> {
        let mut state = self.state();
        state.check("set_list_name")?;
        state.online_mut(id)?.list_name = name.map(str::to_string);
        Ok(())
    }

    fn set_chunk_force_loaded(
        &self,
        world: &str,
        chunk: (i32, i32),
        loaded: bool,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        if state.world(world).is_none() {
            return Err(HostError::WorldUnavailable(world.to_string()));
        }
        let key = (world.to_string(), chunk);
        if loaded {
            state.force_loaded.insert(key);
        } else {
            state.force_loaded.remove(&key);
        }
        Ok(())
    }

    fn send_message(&self, id: EntityId, message: &str) -> Result<(), HostError> {
        let mut state = self.state();
        state.online_mut(id)?.messages.push(message.to_string());
        Ok(())
    }

    fn disconnect(&self, id: EntityId, message: &str) -> Result<(), HostError> {
        let mut state = self.state();
        state.check("disconnect")?;
        state.online_mut(id)?.online = false;
        state.disconnects.push((id, message.to_string()));
        Ok(())
    }

    fn broadcast(&self, message: &str) {
        let mut state = self.state();
        state.broadcasts.push(message.to_string());
        for entity in state.entities.values_mut().filter(|entity| entity.online) {
            entity.messages.push(message.to_string());
        }
    }
}
