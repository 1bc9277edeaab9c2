pub mod controller;
pub mod gatekeeper;
pub mod health;
pub mod orchestrator;
pub mod profile;
pub mod reset;
pub mod screens;
pub mod session;
pub mod telegram;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
