use crate::afk::engine::AfkEngine;
use crate::afk::scheduler::spawn_scheduler_loop;
use crate::control::ServerControl;
use crate::error::PersistenceError;
use crate::persistence::autosave::spawn_autosave_loop;
use crate::world::host::Host;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Owns the engine's background threads: the inactivity checker and the
/// backup autosave.
pub struct AfkRuntime<H: Host + 'static> {
    engine: Arc<AfkEngine<H>>,
    control: Arc<ServerControl>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl<H: Host + 'static> AfkRuntime<H> {
    /// Restores the crash-recovery snapshot and starts both loops.
    pub fn start(engine: Arc<AfkEngine<H>>) -> Self {
        let restored = engine.restore_backup();
        if restored > 0 {
            tracing::info!("{} entities pending return from a previous session", restored);
        }
        let control = Arc::new(ServerControl::new());
        let handles = vec![
            (
                "scheduler",
                spawn_scheduler_loop(Arc::clone(&engine), Arc::clone(&control)),
            ),
            (
                "autosave",
                spawn_autosave_loop(Arc::clone(&engine), Arc::clone(&control)),
            ),
        ];
        tracing::info!("afk engine started");
        Self {
            engine,
            control,
            handles,
        }
    }

    pub fn engine(&self) -> &Arc<AfkEngine<H>> {
        &self.engine
    }

    pub fn control(&self) -> &Arc<ServerControl> {
        &self.control
    }

    /// Cancels and joins the loops, then returns every away entity and
    /// flushes the snapshot.
    pub fn shutdown(self) -> Result<usize, PersistenceError> {
        self.control.request_shutdown();
        for (name, handle) in self.handles {
            if handle.join().is_err() {
                tracing::error!("{} thread panicked", name);
            }
        }
        self.engine.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::persistence::backup::BackupStore;
    use crate::world::sim::SimHost;

    #[test]
    fn shutdown_joins_threads_and_returns_entities() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(SimHost::new());
        let engine = Arc::new(AfkEngine::new(
            Arc::clone(&host),
            Settings::default(),
            BackupStore::from_root(dir.path()),
        ));
        let runtime = AfkRuntime::start(Arc::clone(&engine));
        let id = host.join("Alex");
        let origin = host.entity(id).unwrap().location;
        engine.set_away(id, true).unwrap();
        assert_eq!(host.entity(id).unwrap().location.world, "world_afk");

        assert_eq!(runtime.shutdown().unwrap(), 0);
        assert_eq!(host.entity(id).unwrap().location, origin);
        assert!(engine.store().is_empty());
    }

    #[test]
    fn start_restores_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(SimHost::new());
        let id = host.join("Alex");
        let first = AfkEngine::new(Arc::clone(&host), Settings::default(), BackupStore::from_root(dir.path()));
        first.set_away(id, true).unwrap();
        first.save_backup().unwrap();

        let engine = Arc::new(AfkEngine::new(
            Arc::clone(&host),
            Settings::default(),
            BackupStore::from_root(dir.path()),
        ));
        let runtime = AfkRuntime::start(Arc::clone(&engine));
        assert!(engine.is_away(id));
        runtime.shutdown().unwrap();
        assert!(!engine.is_away(id));
    }
}
