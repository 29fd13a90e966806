pub mod autosave;
pub mod backup;
