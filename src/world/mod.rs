pub mod holding;
pub mod host;
pub mod position;
pub mod safety;
pub mod sim;
