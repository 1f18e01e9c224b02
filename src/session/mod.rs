mod actor;
mod controller;
mod torch;
mod types;
mod zoom;

#[cfg(test)]
mod tests;

pub use controller::{SessionController, SessionControllerBuilder};
pub use types::{ScanSettings, SessionSnapshot, SessionState};
