// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Exact timing core: device hierarchy, resolution and validation.
//!
//! - [`Instant`]: exact rational time in seconds
//! - [`Instruction`] and [`Payload`]: timed events on one device
//! - [`DeviceNode`] and [`Constraints`]: devices and their physical limits
//! - [`DeviceTree`]: the triggering hierarchy
//! - [`Resolver`]: computes a [`ResolvedSchedule`] of ticks and outputs
//! - [`Validator`]: re-checks a schedule against every constraint

pub mod constraints;
pub mod resolver;
pub mod schedule;
pub mod sequence;
pub mod tree;
pub mod types;
pub mod validator;

pub use constraints::{Constraints, DeviceNode, DeviceRef, DeviceRole, NodeId, RootClockParams};
pub use resolver::{resolve, Resolver};
pub use schedule::{BoundOutput, ClockTrigger, DeviceSchedule, ResolvedSchedule, Timeline};
pub use sequence::{Instruction, InstructionSequence, Payload};
pub use tree::{DeviceTree, Wait};
pub use types::{Instant, ParseInstantError, MAX_DECIMAL_SCALE, MAX_DISPLAY_DIGITS};
pub use validator::Validator;
