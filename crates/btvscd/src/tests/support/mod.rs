//! Test harness utilities for the service suites.

mod client;
mod config_loader;
mod controller;
mod harness;
mod reporter;
mod world;

pub use client::{TestClient, command_frame};
pub use config_loader::{DefaultsConfigLoader, TEST_REPLY_TIMEOUT_MS, test_config};
pub use controller::{RecordingHost, ReplyMode, ScriptedController, command_complete};
pub use harness::{PATIENCE, ServiceHarness, wait_until};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use world::{BootstrapWorld, ServiceWorld, bootstrap_world, service_world};
