mod controller;
mod types;

#[cfg(test)]
mod tests;

pub use controller::{HostController, HostEnvironment, HostState};
pub use types::{DestroyReason, Pattern, SavedState};
