use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Signal {
    Running = 0,
    Shutdown = 1,
}

/// Run flag shared by the background loops; flipping it cancels them.
#[derive(Debug)]
pub struct ServerControl {
    signal: AtomicU8,
}

impl Default for ServerControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerControl {
    pub fn new() -> Self {
        Self {
            signal: AtomicU8::new(Signal::Running as u8),
        }
    }

    pub fn request_shutdown(&self) {
        self.signal.store(Signal::Shutdown as u8, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        matches!(self.current_signal(), Signal::Running)
    }

    fn current_signal(&self) -> Signal {
        match self.signal.load(Ordering::SeqCst) {
            0 => Signal::Running,
            _ => Signal::Shutdown,
        }
    }
}
