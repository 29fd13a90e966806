//! Translates host events into activity updates.
//!
//! Each event handler returns a [`Verdict`] telling the host whether to let
//! the event through, cancel it, or rewrite a movement target.

use crate::afk::engine::{AfkEngine, JoinOutcome, ReturnDestination};
use crate::error::TransitionError;
use crate::world::host::{EntityId, Host};
use crate::world::position::Location;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivitySignal<'a> {
    Move { from: &'a Location, to: &'a Location },
    Chat,
    Command(&'a str),
    BlockBreak,
    BlockPlace,
    Interact,
    InteractEntity,
    InventoryClick,
    Damage,
    Respawn,
    Teleport { from: &'a Location, to: &'a Location },
    WorldChange { from: &'a str },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Proceed,
    Cancel,
    /// Replace the movement target with this location.
    Redirect(Location),
}

pub struct ActivityListener<H: Host> {
    engine: Arc<AfkEngine<H>>,
}

impl<H: Host> ActivityListener<H> {
    pub fn new(engine: Arc<AfkEngine<H>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &AfkEngine<H> {
        &self.engine
    }

    pub fn on_join(&self, id: EntityId) -> JoinOutcome {
        self.engine.on_join(id)
    }

    pub fn on_quit(&self, id: EntityId) -> Option<ReturnDestination> {
        self.engine.on_disconnect(id)
    }

    pub fn handle(&self, id: EntityId, signal: ActivitySignal<'_>) -> Verdict {
        let settings = self.engine.settings();
        let detection = &settings.detection;
        let holding = settings.afk_world.world_name.as_str();
        match signal {
            ActivitySignal::Move { from, to } => {
                if self.engine.is_away(id) && from.displaced(to) {
                    self.touch(id);
                    if self.engine.is_away(id) {
                        let held = from.clone().with_rotation(to.yaw, to.pitch);
                        return Verdict::Redirect(held);
                    }
                    return Verdict::Proceed;
                }
                if detection.movement && from.changed_block(to) {
                    self.touch(id);
                }
            }
            ActivitySignal::Chat if detection.chat => self.touch(id),
            ActivitySignal::Command(line) if detection.commands => {
                if !line.to_lowercase().starts_with("/afk") {
                    self.touch(id);
                }
            }
            ActivitySignal::BlockBreak if detection.block_break => self.touch(id),
            ActivitySignal::BlockPlace if detection.block_place => self.touch(id),
            ActivitySignal::Interact | ActivitySignal::InteractEntity if detection.interact => {
                self.touch(id)
            }
            ActivitySignal::InventoryClick if detection.inventory => self.touch(id),
            ActivitySignal::Damage => {
                if detection.damage {
                    self.touch(id);
                }
                if settings.settings.disable_damage && self.engine.is_away(id) {
                    return Verdict::Cancel;
                }
            }
            ActivitySignal::Respawn => self.touch(id),
            ActivitySignal::Teleport { from, to } => {
                if to.world == holding {
                    return Verdict::Proceed;
                }
                if from.world == holding || detection.movement {
                    self.touch(id);
                }
            }
            ActivitySignal::WorldChange { from } => {
                if from == holding && self.engine.is_away(id) {
                    self.touch(id);
                }
            }
            _ => {}
        }
        Verdict::Proceed
    }

    fn touch(&self, id: EntityId) {
        match self.engine.record_activity(id) {
            Ok(_) | Err(TransitionError::NotOnline(_)) | Err(TransitionError::InProgress(_)) => {}
            Err(err) => tracing::warn!("activity update failed: {}", err),
        }
    }
}
