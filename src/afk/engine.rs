//! AFK lifecycle: the active <-> away state machine and everything that has
//! to happen to an entity when it crosses between the two.
//!
//! Transitions for one identity are serialised by the entry's transition
//! guard. Record locks are only held for short reads and writes; host calls
//! always happen with the record unlocked so host callbacks into the engine
//! cannot deadlock.

use crate::config::{Settings, VehiclePolicy};
use crate::entities::record::AfkRecord;
use crate::entities::store::{EntityEntry, EntityStore};
use crate::error::{PersistenceError, TransitionError, TransitionStep};
use crate::persistence::backup::BackupStore;
use crate::telemetry::logging;
use crate::text::{colorize, render};
use crate::world::holding::{HoldingArea, WorldHandle};
use crate::world::host::{EntityId, EntitySnapshot, Host, Vitals};
use crate::world::position::Location;
use crate::world::safety::{self, Resolution};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Where an entity ended up after leaving the away state.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnDestination {
    /// Back at (or safely near) its saved location.
    Saved(Resolution),
    /// Saved location missing or its world gone; sent to the default spawn.
    Spawn(Location),
    /// Nowhere to send it; left where it was.
    Stayed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Unchanged,
    WentAway { relocated: bool },
    Returned(ReturnDestination),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Nothing,
    /// A recovered away record was found and the entity was sent back.
    Resumed(ReturnDestination),
    /// Found inside the holding area without away status.
    Rescued(Location),
}

pub struct AfkEngine<H: Host> {
    host: Arc<H>,
    store: EntityStore,
    settings: RwLock<Arc<Settings>>,
    holding: HoldingArea,
    backup: BackupStore,
    backup_requested: AtomicBool,
}

fn host_step(id: EntityId, step: TransitionStep) -> impl Fn(crate::error::HostError) -> TransitionError {
    move |source| TransitionError::Host { id, step, source }
}

impl<H: Host> AfkEngine<H> {
    /// Builds the engine and provisions the holding area up front.
    pub fn new(host: Arc<H>, settings: Settings, backup: BackupStore) -> Self {
        let engine = Self {
            host,
            store: EntityStore::new(),
            settings: RwLock::new(Arc::new(settings)),
            holding: HoldingArea::new(),
            backup,
            backup_requested: AtomicBool::new(false),
        };
        engine.prepare_holding_area();
        engine
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn settings(&self) -> Arc<Settings> {
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&settings)
    }

    /// Swaps in a new settings snapshot. Readers see either the old or the
    /// new one, never a mix.
    pub fn reload_settings(&self, settings: Settings) {
        logging::set_debug(settings.settings.debug);
        {
            let mut current = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            *current = Arc::new(settings);
        }
        self.prepare_holding_area();
        debug!("settings reloaded");
    }

    fn prepare_holding_area(&self) -> Option<WorldHandle> {
        let settings = self.settings();
        if !settings.afk_world.enabled {
            return None;
        }
        self.holding.ensure(&*self.host, &settings.afk_world.world_name)
    }

    pub fn record(&self, id: EntityId) -> Option<AfkRecord> {
        self.store.get(id).map(|entry| entry.snapshot())
    }

    pub fn is_away(&self, id: EntityId) -> bool {
        self.store
            .get(id)
            .map_or(false, |entry| entry.lock().is_away())
    }

    pub fn away_count(&self) -> usize {
        self.store.count_where(AfkRecord::is_away)
    }

    pub fn away_duration(&self, id: EntityId) -> Duration {
        self.store
            .get(id)
            .map_or(Duration::ZERO, |entry| entry.lock().away_duration(Instant::now()))
    }

    /// Online away entities with how long each has been away, longest first.
    pub fn away_entities(&self, now: Instant) -> Vec<(EntityId, Duration)> {
        let mut away: Vec<(EntityId, Duration)> = self
            .store
            .all()
            .into_iter()
            .filter(|record| record.is_away() && self.host.is_online(record.id))
            .map(|record| (record.id, record.away_duration(now)))
            .collect();
        away.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        away
    }

    pub fn record_activity(&self, id: EntityId) -> Result<Transition, TransitionError> {
        self.record_activity_at(id, Instant::now())
    }

    /// Refreshes the inactivity clock and wakes the entity if it is away.
    pub fn record_activity_at(
        &self,
        id: EntityId,
        now: Instant,
    ) -> Result<Transition, TransitionError> {
        if !self.host.is_online(id) {
            return Err(TransitionError::NotOnline(id));
        }
        let entry = self.store.get_or_create(id, now);
        let away = {
            let mut record = entry.lock();
            record.touch(now);
            record.is_away()
        };
        if away {
            self.set_away_at(id, false, now)
        } else {
            Ok(Transition::Unchanged)
        }
    }

    pub fn toggle_away(&self, id: EntityId) -> Result<Transition, TransitionError> {
        let now = Instant::now();
        let away = self
            .store
            .get(id)
            .map_or(false, |entry| entry.lock().is_away());
        self.set_away_at(id, !away, now)
    }

    pub fn set_away(&self, id: EntityId, away: bool) -> Result<Transition, TransitionError> {
        self.set_away_at(id, away, Instant::now())
    }

    /// Moves `id` into or out of the away state. Asking for the current
    /// state is a no-op. A host failure part way through is logged and
    /// returned; steps already applied are not rolled back.
    pub fn set_away_at(
        &self,
        id: EntityId,
        away: bool,
        now: Instant,
    ) -> Result<Transition, TransitionError> {
        if !self.host.is_online(id) {
            return Err(TransitionError::NotOnline(id));
        }
        let entry = self.store.get_or_create(id, now);
        let _transition = entry
            .try_begin_transition()
            .ok_or(TransitionError::InProgress(id))?;
        if entry.lock().is_away() == away {
            return Ok(Transition::Unchanged);
        }

        let settings = self.settings();
        let result = if away {
            self.enter_away(id, &entry, &settings, now)
        } else {
            entry.lock().set_away(false, now);
            self.exit_away(id, &entry, &settings)
        };
        match &result {
            Ok(Transition::Unchanged) | Err(TransitionError::Deferred(_)) => {}
            Ok(_) => self.request_backup(),
            Err(err) => {
                self.request_backup();
                error!("afk state change failed for {}: {}", self.name_of(id), err);
            }
        }
        result
    }

    fn enter_away(
        &self,
        id: EntityId,
        entry: &EntityEntry,
        settings: &Settings,
        now: Instant,
    ) -> Result<Transition, TransitionError> {
        let snapshot = self
            .host
            .snapshot(id)
            .map_err(host_step(id, TransitionStep::Snapshot))?;
        if snapshot.in_vehicle && settings.vehicle_policy == VehiclePolicy::Defer {
            debug!("afk deferred for {}: riding a vehicle", self.name_of(id));
            return Err(TransitionError::Deferred(id));
        }
        {
            let mut record = entry.lock();
            record.capture(&snapshot);
            record.set_away(true, now);
        }

        self.host
            .set_fall_distance(id, 0.0)
            .map_err(host_step(id, TransitionStep::FallReset))?;
        if snapshot.in_vehicle {
            self.host
                .leave_vehicle(id)
                .map_err(host_step(id, TransitionStep::Vehicle))?;
        }

        let name = self.name_of(id);
        self.broadcast(settings, &settings.messages.afk_on, &name);
        if settings.settings.tab_prefix {
            let marked = format!("{}{}", colorize(&settings.settings.tab_prefix_format), name);
            self.host
                .set_list_name(id, Some(&marked))
                .map_err(host_step(id, TransitionStep::Marker))?;
        }
        if settings.freeze_chunks {
            self.hold_origin_chunk(id, entry, &snapshot);
        }

        let relocated = if settings.afk_world.enabled {
            self.relocate(id, settings)?
        } else {
            false
        };
        debug!("afk start: {} (relocated: {})", name, relocated);
        Ok(Transition::WentAway { relocated })
    }

    fn hold_origin_chunk(&self, id: EntityId, entry: &EntityEntry, snapshot: &EntitySnapshot) {
        let world = snapshot.location.world.clone();
        let chunk = snapshot.location.block().chunk();
        match self.host.set_chunk_force_loaded(&world, chunk, true) {
            Ok(()) => entry.lock().held_chunk = Some((world, chunk)),
            Err(err) => warn!("could not hold origin chunk for {}: {}", self.name_of(id), err),
        }
    }

    fn release_chunk(&self, entry: &EntityEntry) {
        let held = entry.lock().held_chunk.take();
        if let Some((world, chunk)) = held {
            if let Err(err) = self.host.set_chunk_force_loaded(&world, chunk, false) {
                debug!("origin chunk release failed: {}", err);
            }
        }
    }

    /// Parks the entity in the holding area. An unavailable area or a
    /// refused teleport leaves it in place and is not an error.
    fn relocate(&self, id: EntityId, settings: &Settings) -> Result<bool, TransitionError> {
        let Some(handle) = self.holding.ensure(&*self.host, &settings.afk_world.world_name) else {
            warn!("holding area unavailable, {} stays in place", self.name_of(id));
            return Ok(false);
        };
        let spawn = settings.afk_world.spawn_location;
        let target = Location::new(handle.name, spawn.x, spawn.y, spawn.z);
        if let Err(err) = self.host.teleport(id, &target) {
            warn!("relocation of {} failed, staying in place: {}", self.name_of(id), err);
            return Ok(false);
        }
        self.host
            .set_flight(id, true, true)
            .map_err(host_step(id, TransitionStep::Relocate))?;
        self.host
            .set_invulnerable(id, true)
            .map_err(host_step(id, TransitionStep::Invulnerability))?;
        Ok(true)
    }

    fn exit_away(
        &self,
        id: EntityId,
        entry: &EntityEntry,
        settings: &Settings,
    ) -> Result<Transition, TransitionError> {
        let name = self.name_of(id);
        self.broadcast(settings, &settings.messages.afk_off, &name);
        // The return below must run even when these resets are refused.
        if settings.settings.tab_prefix {
            if let Err(err) = self.host.set_list_name(id, None) {
                warn!("list marker reset failed for {}: {}", name, err);
            }
        }
        if let Err(err) = self.host.set_invulnerable(id, false) {
            warn!("invulnerability reset failed for {}: {}", name, err);
        }
        let destination = self.return_to_origin(id, entry)?;
        debug!("afk end: {}", name);
        Ok(Transition::Returned(destination))
    }

    /// Sends the entity back to where it went away, or to the default spawn
    /// when that is impossible, then restores the saved attributes. The
    /// saved location is consumed either way.
    fn return_to_origin(
        &self,
        id: EntityId,
        entry: &EntityEntry,
    ) -> Result<ReturnDestination, TransitionError> {
        let (saved, flight, vitals) = {
            let mut record = entry.lock();
            (
                record.take_return_location(),
                record.saved_flight,
                record.saved_vitals,
            )
        };
        self.release_chunk(entry);

        let name = self.name_of(id);
        let destination = match saved {
            Some(location) if self.host.world_loaded(&location.world) => {
                let resolution = safety::resolve(&*self.host, &location);
                if !resolution.is_found() {
                    warn!("no safe spot near return point of {}, using original", name);
                } else if let Resolution::Found { offset, .. } = &resolution {
                    debug!("safe return point for {} found at y{:+}", name, offset);
                }
                match self.host.teleport(id, resolution.location()) {
                    Ok(()) => ReturnDestination::Saved(resolution),
                    Err(err) => {
                        warn!("return teleport of {} failed: {}", name, err);
                        self.send_to_spawn(id)
                    }
                }
            }
            Some(location) => {
                warn!(
                    "world {} is not loaded, sending {} to spawn",
                    location.world, name
                );
                self.send_to_spawn(id)
            }
            None => {
                warn!("no return location for {}, sending to spawn", name);
                self.send_to_spawn(id)
            }
        };

        self.host
            .set_flight(id, flight.allow_flight, flight.flying)
            .map_err(host_step(id, TransitionStep::Restore))?;
        if let Some(vitals) = vitals {
            let max_health = self
                .host
                .snapshot(id)
                .map(|snapshot| snapshot.max_health)
                .map_err(host_step(id, TransitionStep::Restore))?;
            self.host
                .set_vitals(
                    id,
                    Vitals {
                        health: vitals.health.min(max_health),
                        ..vitals
                    },
                )
                .map_err(host_step(id, TransitionStep::Restore))?;
        }
        self.host
            .set_fall_distance(id, 0.0)
            .map_err(host_step(id, TransitionStep::FallReset))?;
        Ok(destination)
    }

    fn send_to_spawn(&self, id: EntityId) -> ReturnDestination {
        let Some(spawn) = self.host.default_spawn() else {
            error!("no default world spawn, {} stays in place", self.name_of(id));
            return ReturnDestination::Stayed;
        };
        match self.host.teleport(id, &spawn) {
            Ok(()) => ReturnDestination::Spawn(spawn),
            Err(err) => {
                error!("spawn teleport of {} failed: {}", self.name_of(id), err);
                ReturnDestination::Stayed
            }
        }
    }

    /// Puts an away entity back where it came from, quietly (no broadcast).
    /// Used when the entity is about to leave or the engine is stopping.
    fn restore_quietly(
        &self,
        id: EntityId,
        entry: &EntityEntry,
    ) -> Result<ReturnDestination, TransitionError> {
        if let Err(err) = self.host.set_list_name(id, None) {
            debug!("list name reset failed: {}", err);
        }
        if let Err(err) = self.host.set_invulnerable(id, false) {
            debug!("invulnerability reset failed: {}", err);
        }
        entry.lock().set_away(false, Instant::now());
        self.return_to_origin(id, entry)
    }

    /// Called when an entity leaves. An away entity is first put back where
    /// it came from so it never logs out inside the holding area; then the
    /// record is dropped.
    pub fn on_disconnect(&self, id: EntityId) -> Option<ReturnDestination> {
        let entry = self.store.get(id)?;
        let mut destination = None;
        {
            // Waits out a running transition, then re-reads the state it left.
            let _transition = entry.begin_transition();
            if entry.lock().is_away() {
                match self.restore_quietly(id, &entry) {
                    Ok(returned) => destination = Some(returned),
                    Err(err) => warn!("return on disconnect failed for {}: {}", self.name_of(id), err),
                }
                self.request_backup();
            }
        }
        self.store.remove(id);
        debug!("stopped tracking {}", id);
        destination
    }

    /// Disconnects an entity for inactivity.
    pub fn kick(&self, id: EntityId) -> Result<(), TransitionError> {
        let settings = self.settings();
        let name = self.name_of(id);
        self.on_disconnect(id);
        self.host
            .disconnect(id, &colorize(&settings.kick_message))
            .map_err(host_step(id, TransitionStep::Disconnect))?;
        info!("kicked for inactivity: {}", name);
        Ok(())
    }

    /// Reconnect handling: resume a recovered away record, or rescue an
    /// entity that is sitting in the holding area without away status.
    pub fn on_join(&self, id: EntityId) -> JoinOutcome {
        let now = Instant::now();
        let entry = self.store.get_or_create(id, now);
        let away = entry.lock().is_away();
        if away {
            return match self.set_away_at(id, false, now) {
                Ok(Transition::Returned(destination)) => {
                    info!("restored {} from a previous session", self.name_of(id));
                    JoinOutcome::Resumed(destination)
                }
                Ok(_) => JoinOutcome::Nothing,
                Err(err) => {
                    warn!("could not restore {} on join: {}", self.name_of(id), err);
                    JoinOutcome::Nothing
                }
            };
        }
        entry.lock().touch(now);

        let settings = self.settings();
        let in_holding = self
            .host
            .snapshot(id)
            .map_or(false, |snapshot| snapshot.location.world == settings.afk_world.world_name);
        if !in_holding {
            return JoinOutcome::Nothing;
        }
        match self.send_to_spawn(id) {
            ReturnDestination::Spawn(spawn) => {
                if let Err(err) = self.host.set_invulnerable(id, false) {
                    debug!("invulnerability reset failed: {}", err);
                }
                info!("{} was in the holding area without afk status, sent to spawn", self.name_of(id));
                JoinOutcome::Rescued(spawn)
            }
            _ => JoinOutcome::Nothing,
        }
    }

    pub fn request_backup(&self) {
        self.backup_requested.store(true, Ordering::SeqCst);
    }

    /// Clears and returns the pending backup request flag.
    pub fn take_backup_request(&self) -> bool {
        self.backup_requested.swap(false, Ordering::SeqCst)
    }

    /// Writes the crash-recovery snapshot now. A no-op when backups are off.
    pub fn save_backup(&self) -> Result<usize, PersistenceError> {
        if !self.settings().settings.backup_locations {
            return Ok(0);
        }
        let saved = self.backup.save(&self.store.all())?;
        debug!("backup saved: {} away entities", saved);
        Ok(saved)
    }

    /// Merges the crash-recovery snapshot into the store and deletes it.
    /// Returns how many records were recovered.
    pub fn restore_backup(&self) -> usize {
        if !self.settings().settings.backup_locations || !self.backup.exists() {
            return 0;
        }
        let host = &self.host;
        let report = match self.backup.load(|world| host.world_loaded(world), Instant::now()) {
            Ok(report) => report,
            Err(err) => {
                error!("backup restore failed: {}", err);
                return 0;
            }
        };
        for world in &report.skipped_worlds {
            warn!("backup entry skipped, world {} not loaded", world);
        }
        for problem in &report.invalid {
            warn!("backup entry unreadable: {}", problem);
        }
        let restored = report
            .records
            .into_iter()
            .filter(|record| self.store.merge_recovered(record.clone()))
            .count();
        info!("backup restored: {} away entities", restored);
        restored
    }

    /// Returns every away entity that is still online, then flushes the
    /// snapshot so anything that could not be returned survives a restart.
    pub fn shutdown(&self) -> Result<usize, PersistenceError> {
        for id in self.store.ids() {
            let Some(entry) = self.store.get(id) else {
                continue;
            };
            let _transition = entry.begin_transition();
            if !entry.lock().is_away() || !self.host.is_online(id) {
                continue;
            }
            match self.restore_quietly(id, &entry) {
                Ok(_) => debug!("returned {} before shutdown", self.name_of(id)),
                Err(err) => error!("return of {} before shutdown failed: {}", self.name_of(id), err),
            }
        }
        let saved = self.save_backup();
        self.store.clear();
        debug!("afk engine stopped");
        saved
    }

    fn broadcast(&self, settings: &Settings, template: &str, name: &str) {
        if template.is_empty() {
            return;
        }
        let message = format!("{}{}", settings.messages.prefix, template);
        self.host.broadcast(&render(&message, &[("player", name)]));
    }

    pub(crate) fn name_of(&self, id: EntityId) -> String {
        self.host
            .display_name(id)
            .unwrap_or_else(|| id.to_string())
    }
}
