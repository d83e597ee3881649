// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! The resolver's output: [`ResolvedSchedule`].
//!
//! A schedule is a self-contained value. Every device entry carries its own
//! copy of the role, parent id, constraints and trigger delay it was
//! resolved with, so the [`Validator`](super::Validator) can re-check it
//! without access to the tree.

use indexmap::IndexMap;
use serde::Serialize;

use super::constraints::{Constraints, DeviceRef, DeviceRole, NodeId};
use super::sequence::Payload;
use super::tree::Wait;
use super::types::Instant;

/// Parent tick that started a subordinate clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClockTrigger {
    /// Index into the parent's tick list.
    pub tick: usize,
    /// Absolute instant of that parent tick.
    pub at: Instant,
}

/// One output a device executes, in absolute time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundOutput {
    pub time: Instant,
    pub payload: Payload,
    /// Index of the tick that fires this output: the parent's tick for a
    /// terminal, the clock's own tick for a clock instruction. `None` for
    /// static outputs, which need no clock.
    pub tick: Option<usize>,
    /// Index of the source instruction in the device's instruction list.
    pub instruction: usize,
    /// Sample number within a ramp.
    pub sample: Option<u64>,
    /// End of the source instruction (`time + duration`), before settling.
    pub busy_until: Instant,
}

/// What a device does over the experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timeline {
    Clock {
        trigger: Option<ClockTrigger>,
        ticks: Vec<Instant>,
        /// The clock's own instructions, each on the tick it emits.
        instructions: Vec<BoundOutput>,
    },
    Terminal {
        outputs: Vec<BoundOutput>,
    },
}

/// Resolved timing of a single device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSchedule {
    pub id: NodeId,
    pub name: String,
    pub role: DeviceRole,
    pub parent: Option<NodeId>,
    pub constraints: Constraints,
    pub trigger_delay: Instant,
    /// Largest minimum period among this device and the terminals it
    /// drives directly, rounded up to the root granularity for clocks.
    pub effective_min_period: Instant,
    /// Device whose `min_period` set `effective_min_period`.
    pub limiting_device: NodeId,
    /// Longest trigger pulse needed by this device or, for clocks, any
    /// device it drives directly. Consecutive ticks are at least twice
    /// this apart.
    pub min_trigger: Instant,
    /// Device whose `min_trigger` set `min_trigger`.
    pub trigger_limiting_device: NodeId,
    pub timeline: Timeline,
}

impl DeviceSchedule {
    pub fn device_ref(&self) -> DeviceRef {
        DeviceRef::new(self.id, self.name.clone())
    }

    /// Tick list, for clocks.
    pub fn ticks(&self) -> Option<&[Instant]> {
        match &self.timeline {
            Timeline::Clock { ticks, .. } => Some(ticks),
            Timeline::Terminal { .. } => None,
        }
    }

    /// Bound outputs, for terminals.
    pub fn outputs(&self) -> Option<&[BoundOutput]> {
        match &self.timeline {
            Timeline::Terminal { outputs } => Some(outputs),
            Timeline::Clock { .. } => None,
        }
    }

    /// A clock's own instructions, bound to its ticks.
    pub fn clock_instructions(&self) -> Option<&[BoundOutput]> {
        match &self.timeline {
            Timeline::Clock { instructions, .. } => Some(instructions),
            Timeline::Terminal { .. } => None,
        }
    }

    pub fn trigger(&self) -> Option<&ClockTrigger> {
        match &self.timeline {
            Timeline::Clock { trigger, .. } => trigger.as_ref(),
            Timeline::Terminal { .. } => None,
        }
    }
}

/// Immutable, hardware-valid timing of a whole device tree.
///
/// Devices are keyed by [`NodeId`] and iterate in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSchedule {
    revision: u64,
    granularity: Instant,
    wait_delay: Instant,
    waits: Vec<Wait>,
    devices: IndexMap<NodeId, DeviceSchedule>,
}

impl ResolvedSchedule {
    pub(crate) fn new(
        revision: u64,
        granularity: Instant,
        wait_delay: Instant,
        waits: Vec<Wait>,
        devices: IndexMap<NodeId, DeviceSchedule>,
    ) -> Self {
        Self {
            revision,
            granularity,
            wait_delay,
            waits,
            devices,
        }
    }

    /// Tree revision this schedule was resolved from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Root clock timebase.
    pub fn granularity(&self) -> &Instant {
        &self.granularity
    }

    pub fn wait_delay(&self) -> &Instant {
        &self.wait_delay
    }

    pub fn waits(&self) -> &[Wait] {
        &self.waits
    }

    pub fn device(&self, id: NodeId) -> Option<&DeviceSchedule> {
        self.devices.get(&id)
    }

    /// The root clock's entry.
    pub fn root(&self) -> Option<&DeviceSchedule> {
        self.devices.values().find(|d| d.role == DeviceRole::RootClock)
    }

    pub fn ticks(&self, id: NodeId) -> Option<&[Instant]> {
        self.device(id).and_then(DeviceSchedule::ticks)
    }

    pub fn outputs(&self, id: NodeId) -> Option<&[BoundOutput]> {
        self.device(id).and_then(DeviceSchedule::outputs)
    }

    /// Devices in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceSchedule> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Mutable access for validator tests that need a corrupted schedule.
    #[cfg(test)]
    pub(crate) fn device_mut(&mut self, id: NodeId) -> Option<&mut DeviceSchedule> {
        self.devices.get_mut(&id)
    }
}
