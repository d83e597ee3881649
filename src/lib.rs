// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Clocktree: exact timing for triggered experiment hardware
//!
//! This crate computes hardware-valid clock schedules for devices arranged
//! in a triggering hierarchy: one master clock driving subordinate clocks
//! and output devices. All timing is exact rational arithmetic.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     ExperimentDescription (YAML/JSON)    │
//! ├─────────────────────────────────────────┤
//! │               DeviceTree                 │
//! ├──────────────────┬──────────────────────┤
//! │   Resolver       │   Validator          │
//! │   (two passes)   │   (re-check)         │
//! ├──────────────────┴──────────────────────┤
//! │            ResolvedSchedule              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`temporal`]: Instants, device tree, resolver and validator
//! - [`experiment`]: Serialized experiment descriptions
//! - [`config`]: Configuration management
//! - [`validation`]: Description limit checks
//! - [`error`]: Error types

pub mod config;
pub mod error;
pub mod experiment;
pub mod temporal;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result, ScheduleError};
pub use experiment::ExperimentDescription;
pub use temporal::{resolve, DeviceTree, Instant, ResolvedSchedule, Resolver};

#[cfg(test)]
pub mod test_utils;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
