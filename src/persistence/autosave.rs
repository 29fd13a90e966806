use crate::afk::engine::AfkEngine;
use crate::control::ServerControl;
use crate::world::host::Host;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How long a transition may sit unsaved before the snapshot is flushed.
pub const DEBOUNCE: Duration = Duration::from_secs(2);
const POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub interval_seconds: u64,
}

impl AutosaveConfig {
    pub fn interval(self) -> Option<Duration> {
        if self.interval_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.interval_seconds.max(1)))
        }
    }
}

/// Decides when the backup is written: on a fixed interval, and a short
/// while after the first unsaved change.
#[derive(Debug, Clone)]
pub struct AutosaveState {
    interval: Option<Duration>,
    next_due: Option<Instant>,
    dirty_since: Option<Instant>,
}

impl AutosaveState {
    pub fn new(config: AutosaveConfig, now: Instant) -> Self {
        let interval = config.interval();
        let next_due = interval.map(|interval| now + interval);
        Self {
            interval,
            next_due,
            dirty_since: None,
        }
    }

    /// Applies a changed interval; the next periodic save is rescheduled
    /// from `now`.
    pub fn reconfigure(&mut self, config: AutosaveConfig, now: Instant) {
        let interval = config.interval();
        if interval != self.interval {
            self.interval = interval;
            self.next_due = interval.map(|interval| now + interval);
        }
    }

    /// Notes an unsaved change. Repeated calls keep the first timestamp so
    /// a steady stream of changes cannot postpone the flush forever.
    pub fn mark_dirty(&mut self, now: Instant) {
        self.dirty_since.get_or_insert(now);
    }

    pub fn due(&self, now: Instant) -> bool {
        let periodic = self.next_due.map_or(false, |next| now >= next);
        let debounced = self
            .dirty_since
            .map_or(false, |since| now.saturating_duration_since(since) >= DEBOUNCE);
        periodic || debounced
    }

    pub fn mark_saved(&mut self, now: Instant) {
        self.dirty_since = None;
        if let Some(interval) = self.interval {
            self.next_due = Some(now + interval);
        }
    }
}

fn config_for<H: Host>(engine: &AfkEngine<H>) -> AutosaveConfig {
    AutosaveConfig {
        interval_seconds: engine.settings().backup_interval,
    }
}

/// Runs one autosave step. Returns true when a save was attempted.
pub fn autosave_step<H: Host>(engine: &AfkEngine<H>, state: &mut AutosaveState, now: Instant) -> bool {
    state.reconfigure(config_for(engine), now);
    if engine.take_backup_request() {
        state.mark_dirty(now);
    }
    if !state.due(now) {
        return false;
    }
    match engine.save_backup() {
        Ok(saved) => tracing::debug!("autosave completed (away: {})", saved),
        Err(err) => tracing::error!("autosave failed: {}", err),
    }
    state.mark_saved(now);
    true
}

pub fn spawn_autosave_loop<H: Host + 'static>(
    engine: Arc<AfkEngine<H>>,
    control: Arc<ServerControl>,
) -> thread::JoinHandle<()> {
    let config = config_for(&engine);
    tracing::info!(
        "autosave enabled: interval={}s debounce={}s",
        config.interval_seconds,
        DEBOUNCE.as_secs()
    );
    thread::spawn(move || {
        let mut state = AutosaveState::new(config, Instant::now());
        while control.is_running() {
            autosave_step(&engine, &mut state, Instant::now());
            thread::sleep(POLL);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::persistence::backup::BackupStore;
    use crate::world::sim::SimHost;

    #[test]
    fn interval_zero_disables_periodic_saves() {
        let now = Instant::now();
        let state = AutosaveState::new(AutosaveConfig { interval_seconds: 0 }, now);
        assert!(!state.due(now + Duration::from_secs(100_000)));
    }

    #[test]
    fn periodic_save_reschedules() {
        let now = Instant::now();
        let mut state = AutosaveState::new(AutosaveConfig { interval_seconds: 10 }, now);
        assert!(!state.due(now + Duration::from_secs(9)));
        assert!(state.due(now + Duration::from_secs(10)));
        state.mark_saved(now + Duration::from_secs(10));
        assert!(!state.due(now + Duration::from_secs(19)));
        assert!(state.due(now + Duration::from_secs(20)));
    }

    #[test]
    fn dirty_flag_flushes_after_debounce() {
        let now = Instant::now();
        let mut state = AutosaveState::new(AutosaveConfig { interval_seconds: 300 }, now);
        state.mark_dirty(now);
        state.mark_dirty(now + Duration::from_secs(1));
        assert!(!state.due(now + Duration::from_secs(1)));
        assert!(state.due(now + DEBOUNCE));
        state.mark_saved(now + DEBOUNCE);
        assert!(!state.due(now + DEBOUNCE + Duration::from_secs(5)));
    }

    #[test]
    fn step_saves_after_a_transition() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(SimHost::new());
        let engine = AfkEngine::new(
            Arc::clone(&host),
            Settings::default(),
            BackupStore::from_root(dir.path()),
        );
        let id = host.join("Alex");
        let now = Instant::now();
        let mut state = AutosaveState::new(config_for(&engine), now);
        assert!(!autosave_step(&engine, &mut state, now));

        engine.set_away(id, true).unwrap();
        assert!(!autosave_step(&engine, &mut state, now));
        assert!(!dir.path().join("backup.yml").exists());
        assert!(autosave_step(&engine, &mut state, now + DEBOUNCE));
        let text = std::fs::read_to_string(dir.path().join("backup.yml")).unwrap();
        assert!(text.contains(&id.to_string()));
    }
}
