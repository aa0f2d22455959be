//! # Orchestrator
//!
//! The dispatch subsystem: binds ready beads to idle agents, drives a
//! per-bead workflow state machine, and bounds agent iteration with a
//! loop detector. See `SPEC_FULL.md` at the workspace root for the
//! full component contract.

#![forbid(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod events;
pub mod loop_detector;
pub mod model;
pub mod motivation;
pub mod persona;
pub mod readiness;
pub mod router;
pub mod store;
pub mod worker;
pub mod workflow_engine;

pub use dispatch_core::{Error, Result};
