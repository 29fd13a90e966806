pub mod engine;
pub mod runtime;
pub mod scheduler;
pub mod signals;
