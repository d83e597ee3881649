// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Devices of the triggering hierarchy and their timing constraints.
//!
//! A [`DeviceNode`] is either the single root clock, a subordinate clock it
//! (directly or indirectly) triggers, or a terminal output device driven by
//! a clock. Each node carries a fixed set of [`Constraints`] describing what
//! the physical device can execute.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::sequence::InstructionSequence;
use super::types::Instant;
use crate::error::ScheduleError;

/// Arena index of a device inside its [`DeviceTree`](super::DeviceTree).
///
/// Ids are handed out in declaration order and never reused, so comparing
/// two ids compares declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A device id together with its name, as reported in errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceRef {
    pub id: NodeId,
    pub name: String,
}

impl DeviceRef {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({})", self.name, self.id)
    }
}

/// Position of a device in the triggering hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// The master clock generator; exactly one per tree, without parent.
    RootClock,
    /// A subordinate clock generator, started by an edge from its parent.
    Clock,
    /// An output device executing instructions on its parent's edges.
    Terminal,
}

impl DeviceRole {
    /// Whether devices of this role emit ticks and may have children.
    pub fn is_clock(self) -> bool {
        matches!(self, DeviceRole::RootClock | DeviceRole::Clock)
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::RootClock => write!(f, "root_clock"),
            DeviceRole::Clock => write!(f, "clock"),
            DeviceRole::Terminal => write!(f, "terminal"),
        }
    }
}

/// Physical timing limits of one device.
///
/// | Field | Meaning |
/// |-------|---------|
/// | `min_period` | Shortest spacing between two consecutive ticks or instructions |
/// | `max_instructions` | Capacity of the device's instruction memory (`None` = unbounded) |
/// | `settling_time` | Dead time after an instruction ends before the next may start |
/// | `min_trigger` | Shortest high (and low) time of a trigger pulse the device still sees |
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub min_period: Instant,
    #[serde(default)]
    pub max_instructions: Option<u64>,
    #[serde(default)]
    pub settling_time: Instant,
    #[serde(default)]
    pub min_trigger: Instant,
}

impl Constraints {
    pub fn new(min_period: Instant) -> Self {
        Self {
            min_period,
            ..Self::default()
        }
    }

    pub fn with_max_instructions(mut self, max_instructions: u64) -> Self {
        self.max_instructions = Some(max_instructions);
        self
    }

    pub fn with_settling_time(mut self, settling_time: Instant) -> Self {
        self.settling_time = settling_time;
        self
    }

    pub fn with_min_trigger(mut self, min_trigger: Instant) -> Self {
        self.min_trigger = min_trigger;
        self
    }

    /// Reject negative durations.
    pub(crate) fn check(&self, device: &str) -> Result<(), ScheduleError> {
        for (field, value) in [
            ("min_period", &self.min_period),
            ("settling_time", &self.settling_time),
            ("min_trigger", &self.min_trigger),
        ] {
            if value.is_negative() {
                return Err(ScheduleError::NegativeTime {
                    device: device.to_string(),
                    field,
                    instant: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Constructor parameters specific to the root clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootClockParams {
    /// Tick resolution: every tick must be an integer multiple of this.
    pub granularity: Instant,
    /// Minimum time after a wait before the root clock responds to a
    /// retrigger.
    #[serde(default)]
    pub wait_delay: Instant,
}

impl RootClockParams {
    pub fn new(granularity: Instant) -> Self {
        Self {
            granularity,
            wait_delay: Instant::zero(),
        }
    }

    pub fn with_wait_delay(mut self, wait_delay: Instant) -> Self {
        self.wait_delay = wait_delay;
        self
    }
}

/// One device of the hierarchy, owned by the tree's arena.
#[derive(Debug, Clone)]
pub struct DeviceNode {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) role: DeviceRole,
    pub(crate) constraints: Constraints,
    pub(crate) trigger_delay: Instant,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) instructions: InstructionSequence,
}

impl DeviceNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Minimum time between a trigger edge arriving and this device acting
    /// on it.
    pub fn trigger_delay(&self) -> &Instant {
        &self.trigger_delay
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Devices driven by this one, in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn instructions(&self) -> &InstructionSequence {
        &self.instructions
    }

    pub fn device_ref(&self) -> DeviceRef {
        DeviceRef::new(self.id, self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_is_clock() {
        assert!(DeviceRole::RootClock.is_clock());
        assert!(DeviceRole::Clock.is_clock());
        assert!(!DeviceRole::Terminal.is_clock());
    }

    #[test]
    fn test_role_serde_snake_case() {
        let role: DeviceRole = serde_yaml::from_str("root_clock").unwrap();
        assert_eq!(role, DeviceRole::RootClock);
        assert_eq!(DeviceRole::Terminal.to_string(), "terminal");
    }

    #[test]
    fn test_constraints_builder() {
        let c = Constraints::new(Instant::micros(1))
            .with_max_instructions(16)
            .with_settling_time(Instant::nanos(200))
            .with_min_trigger(Instant::nanos(50));
        assert_eq!(c.min_period, Instant::micros(1));
        assert_eq!(c.max_instructions, Some(16));
        assert_eq!(c.settling_time, Instant::nanos(200));
        assert_eq!(c.min_trigger, Instant::nanos(50));
    }

    #[test]
    fn test_constraints_check_rejects_negative() {
        let c = Constraints::new(Instant::zero() - Instant::nanos(1));
        let err = c.check("ao0").unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::NegativeTime {
                field: "min_period",
                ..
            }
        ));

        let c = Constraints::default().with_settling_time(Instant::zero() - Instant::nanos(1));
        assert!(c.check("ao0").is_err());

        let c = Constraints::default().with_min_trigger(Instant::zero() - Instant::nanos(1));
        assert!(matches!(
            c.check("ao0"),
            Err(ScheduleError::NegativeTime {
                field: "min_trigger",
                ..
            })
        ));
    }

    #[test]
    fn test_constraints_yaml_defaults() {
        let c: Constraints = serde_yaml::from_str("min_period: 1us").unwrap();
        assert_eq!(c.min_period, Instant::micros(1));
        assert_eq!(c.max_instructions, None);
        assert!(c.settling_time.is_zero());
        assert!(c.min_trigger.is_zero());
    }

    #[test]
    fn test_device_ref_display() {
        let d = DeviceRef::new(NodeId(4), "ni_card");
        assert_eq!(d.to_string(), "'ni_card' (#4)");
    }
}
