use crate::world::host::EntityId;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by the hosting simulation for a single capability call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("entity {0} is not online")]
    Offline(EntityId),
    #[error("world '{0}' is not available")]
    WorldUnavailable(String),
    #[error("host rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
}

/// Step of a state transition, used to tag host failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStep {
    Snapshot,
    FallReset,
    Vehicle,
    Marker,
    Relocate,
    Invulnerability,
    Return,
    Restore,
    Disconnect,
}

impl std::fmt::Display for TransitionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransitionStep::Snapshot => "snapshot",
            TransitionStep::FallReset => "fall reset",
            TransitionStep::Vehicle => "vehicle exit",
            TransitionStep::Marker => "list marker",
            TransitionStep::Relocate => "relocation",
            TransitionStep::Invulnerability => "invulnerability",
            TransitionStep::Return => "return teleport",
            TransitionStep::Restore => "attribute restore",
            TransitionStep::Disconnect => "disconnect",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("entity {0} is not online")]
    NotOnline(EntityId),
    #[error("a transition for {0} is already running")]
    InProgress(EntityId),
    #[error("entity {0} is riding a vehicle, transition deferred")]
    Deferred(EntityId),
    #[error("{step} failed for {id}: {source}")]
    Host {
        id: EntityId,
        step: TransitionStep,
        #[source]
        source: HostError,
    },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("backup io failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("backup format invalid in {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config format invalid in {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
