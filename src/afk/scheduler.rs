//! Once-a-second inactivity sweep: auto-away, kick countdown and kicks.

use crate::afk::engine::{AfkEngine, Transition};
use crate::control::ServerControl;
use crate::error::TransitionError;
use crate::text::render;
use crate::world::host::{EntityId, Host};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Seconds-before-kick at which a countdown warning is sent.
pub const WARNING_THRESHOLDS: [u64; 6] = [120, 90, 60, 30, 10, 5];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Idle,
    WentAway,
    Warned(u64),
    Kicked,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub scanned: usize,
    pub went_away: usize,
    pub warned: usize,
    pub kicked: usize,
    pub errors: Vec<(EntityId, TransitionError)>,
}

/// Applies the timeout policy to one connected entity.
pub fn check_entity<H: Host>(
    engine: &AfkEngine<H>,
    id: EntityId,
    now: Instant,
) -> Result<CheckOutcome, TransitionError> {
    let settings = engine.settings();
    let entry = engine.store().get_or_create(id, now);
    let (away, inactive) = {
        let record = entry.lock();
        (record.is_away(), record.inactive_for(now))
    };

    if !away {
        if inactive < settings.afk_timeout() {
            return Ok(CheckOutcome::Idle);
        }
        return match engine.set_away_at(id, true, now)? {
            Transition::WentAway { .. } => Ok(CheckOutcome::WentAway),
            _ => Ok(CheckOutcome::Idle),
        };
    }

    let Some(kick_timeout) = settings.kick_timeout() else {
        return Ok(CheckOutcome::Idle);
    };
    if engine.host().has_permission(id, &settings.bypass_permission) {
        return Ok(CheckOutcome::Idle);
    }
    let Some(time_left) = kick_timeout.checked_sub(inactive).filter(|left| !left.is_zero()) else {
        engine.kick(id)?;
        return Ok(CheckOutcome::Kicked);
    };

    let seconds_left = time_left.as_secs();
    if !WARNING_THRESHOLDS.contains(&seconds_left) || !entry.lock().mark_warned(seconds_left) {
        return Ok(CheckOutcome::Idle);
    }
    let warning = render(
        &settings.messages.afk_kick_warning,
        &[("time", &seconds_left.to_string())],
    );
    if let Err(err) = engine.host().send_message(id, &warning) {
        tracing::debug!("kick warning not delivered: {}", err);
    }
    Ok(CheckOutcome::Warned(seconds_left))
}

/// Scans every connected entity once. A failure for one entity is logged
/// and collected; the rest of the scan continues.
pub fn tick<H: Host>(engine: &AfkEngine<H>, now: Instant) -> TickReport {
    let mut report = TickReport::default();
    for id in engine.host().online_entities() {
        report.scanned += 1;
        match check_entity(engine, id, now) {
            Ok(CheckOutcome::Idle) => {}
            Ok(CheckOutcome::WentAway) => report.went_away += 1,
            Ok(CheckOutcome::Warned(_)) => report.warned += 1,
            Ok(CheckOutcome::Kicked) => report.kicked += 1,
            Err(TransitionError::InProgress(_)) | Err(TransitionError::Deferred(_)) => {}
            Err(err) => {
                tracing::error!("inactivity check failed for {}: {}", engine.name_of(id), err);
                report.errors.push((id, err));
            }
        }
    }
    report
}

pub fn spawn_scheduler_loop<H: Host + 'static>(
    engine: Arc<AfkEngine<H>>,
    control: Arc<ServerControl>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        tracing::debug!("afk checker started");
        let mut next = Instant::now() + TICK_INTERVAL;
        while control.is_running() {
            let now = Instant::now();
            if now >= next {
                let report = tick(&engine, now);
                if report.went_away + report.kicked > 0 {
                    tracing::debug!(
                        "tick: scanned={} away={} kicked={}",
                        report.scanned,
                        report.went_away,
                        report.kicked
                    );
                }
                next += TICK_INTERVAL;
                if next < now {
                    next = now + TICK_INTERVAL;
                }
            }
            thread::sleep(Duration::from_millis(100));
        }
        tracing::debug!("afk checker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::persistence::backup::BackupStore;
    use crate::world::sim::SimHost;

    fn setup(settings: Settings) -> (Arc<SimHost>, AfkEngine<SimHost>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(SimHost::new());
        let engine = AfkEngine::new(Arc::clone(&host), settings, BackupStore::from_root(dir.path()));
        (host, engine, dir)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn inactivity_triggers_away_once() {
        let (host, engine, _dir) = setup(Settings::default());
        let id = host.join("Alex");
        let start = Instant::now();
        engine.on_join(id);
        engine.record_activity_at(id, start).unwrap();

        assert_eq!(check_entity(&engine, id, start + secs(299)).unwrap(), CheckOutcome::Idle);
        assert_eq!(check_entity(&engine, id, start + secs(300)).unwrap(), CheckOutcome::WentAway);
        assert!(engine.is_away(id));
        assert_eq!(check_entity(&engine, id, start + secs(301)).unwrap(), CheckOutcome::Idle);
        assert_eq!(host.broadcasts().len(), 1);
    }

    #[test]
    fn warnings_fire_once_per_threshold_in_order() {
        let (host, engine, _dir) = setup(Settings::default());
        let id = host.join("Alex");
        let start = Instant::now();
        engine.record_activity_at(id, start).unwrap();

        let mut warned = Vec::new();
        // kick at 1800s; tick every second, twice per second near thresholds
        for half_seconds in 0..(1800 * 2) {
            let now = start + Duration::from_millis(half_seconds * 500);
            if let CheckOutcome::Warned(left) = check_entity(&engine, id, now).unwrap() {
                warned.push(left);
            }
        }
        assert_eq!(warned, vec![120, 90, 60, 30, 10, 5]);
        let messages = host.messages(id);
        assert!(messages.iter().any(|m| m.contains("kicked in 5 seconds")));
        assert!(host.disconnects().is_empty());
    }

    #[test]
    fn kick_after_timeout_returns_then_disconnects() {
        let (host, engine, _dir) = setup(Settings::default());
        let id = host.join("Alex");
        let origin = host.entity(id).unwrap().location;
        let start = Instant::now();
        engine.record_activity_at(id, start).unwrap();
        check_entity(&engine, id, start + secs(300)).unwrap();
        assert_ne!(host.entity(id).unwrap().location, origin);

        assert_eq!(check_entity(&engine, id, start + secs(1800)).unwrap(), CheckOutcome::Kicked);
        let entity = host.entity(id).unwrap();
        assert!(!entity.online);
        assert_eq!(entity.location, origin);
        assert_eq!(entity.list_name, None);
        assert_eq!(host.disconnects().len(), 1);
        assert!(host.disconnects()[0].1.contains("kicked for being AFK"));
        assert!(engine.record(id).is_none());
    }

    #[test]
    fn zero_kick_timeout_never_kicks() {
        let mut settings = Settings::default();
        settings.kick_timeout = 0;
        let (host, engine, _dir) = setup(settings);
        let id = host.join("Alex");
        let start = Instant::now();
        engine.record_activity_at(id, start).unwrap();
        check_entity(&engine, id, start + secs(300)).unwrap();
        assert_eq!(check_entity(&engine, id, start + secs(100_000)).unwrap(), CheckOutcome::Idle);
        assert!(host.disconnects().is_empty());
        assert!(host.messages(id).iter().all(|m| !m.contains("kicked in")));
    }

    #[test]
    fn bypass_permission_skips_kick() {
        let (host, engine, _dir) = setup(Settings::default());
        let id = host.join("Alex");
        host.grant(id, "smartafk.bypass");
        let start = Instant::now();
        engine.record_activity_at(id, start).unwrap();
        assert_eq!(check_entity(&engine, id, start + secs(300)).unwrap(), CheckOutcome::WentAway);
        assert_eq!(check_entity(&engine, id, start + secs(5000)).unwrap(), CheckOutcome::Idle);
        assert!(host.entity(id).unwrap().online);
    }

    #[test]
    fn tick_scans_all_and_isolates_failures() {
        let (host, engine, _dir) = setup(Settings::default());
        let first = host.join("Alex");
        let second = host.join("Sam");
        let start = Instant::now();
        engine.record_activity_at(first, start).unwrap();
        engine.record_activity_at(second, start).unwrap();
        let busy = engine.store().get(first).unwrap();
        let _guard = busy.try_begin_transition().unwrap();

        let report = tick(&engine, start + secs(300));
        assert_eq!(report.scanned, 2);
        assert_eq!(report.went_away, 1);
        assert!(report.errors.is_empty());
        assert!(!engine.is_away(first));
        assert!(engine.is_away(second));
    }
}
