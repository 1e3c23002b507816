//! Testing utilities for workflow engines.
//!
//! This module provides:
//! - A scripted remote executor and a recording progress reporter
//! - Fixture projects and an engine harness

mod fixtures;
mod mocks;

pub use fixtures::{template_project, two_stage_project, EngineHarness, FIXTURE_PROJECT_ID};
pub use mocks::{RecordingProgress, ScriptedRemote};
