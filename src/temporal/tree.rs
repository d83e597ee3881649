// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! The device hierarchy: [`DeviceTree`].
//!
//! Nodes live in an arena indexed by [`NodeId`]; the parent link is an
//! index, not an owning reference. Removed nodes leave a tombstone so that
//! ids stay stable and keep encoding declaration order.
//!
//! Every mutation bumps the tree's revision. A [`ResolvedSchedule`] records
//! the revision it was computed from, which makes staleness checkable
//! without any reference from the schedule back into the tree.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::constraints::{Constraints, DeviceNode, DeviceRef, DeviceRole, NodeId, RootClockParams};
use super::schedule::ResolvedSchedule;
use super::sequence::{Instruction, InstructionSequence, Payload};
use super::types::Instant;
use crate::error::ScheduleError;

/// A named pause of the whole experiment.
///
/// The root clock stops at `time` and resumes on an external retrigger,
/// no sooner than the root's `wait_delay` later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wait {
    pub name: String,
    pub time: Instant,
}

/// The full triggering hierarchy with per-device instructions.
#[derive(Debug, Clone, Default)]
pub struct DeviceTree {
    nodes: Vec<Option<DeviceNode>>,
    names: HashMap<String, NodeId>,
    root: Option<NodeId>,
    root_params: Option<RootClockParams>,
    waits: Vec<Wait>,
    revision: u64,
}

impl DeviceTree {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Structure
    // -------------------------------------------------------------------------

    /// Create the master clock.
    ///
    /// # Errors
    ///
    /// - `InvalidRole` if the tree already has a root, or the granularity
    ///   is not positive
    /// - `DuplicateName` if `name` is taken
    /// - `NegativeTime` for negative constraint durations or wait delay
    pub fn add_root_clock(
        &mut self,
        name: impl Into<String>,
        constraints: Constraints,
        params: RootClockParams,
    ) -> Result<NodeId, ScheduleError> {
        let name = name.into();
        if self.root.is_some() {
            return Err(ScheduleError::InvalidRole {
                device: name,
                role: DeviceRole::RootClock,
                reason: "the tree already has a root clock",
            });
        }
        if !params.granularity.is_positive() {
            return Err(ScheduleError::InvalidRole {
                device: name,
                role: DeviceRole::RootClock,
                reason: "root clock granularity must be positive",
            });
        }
        if params.wait_delay.is_negative() {
            return Err(ScheduleError::NegativeTime {
                device: name,
                field: "wait_delay",
                instant: params.wait_delay,
            });
        }
        self.check_name(&name)?;
        constraints.check(&name)?;

        let id = self.push_node(name, DeviceRole::RootClock, constraints, Instant::zero(), None);
        self.root = Some(id);
        self.root_params = Some(params);
        Ok(id)
    }

    /// Add a subordinate clock or terminal device under `parent`.
    ///
    /// # Errors
    ///
    /// - `InvalidRole` for a second `RootClock`, or a parent that is not a
    ///   clock
    /// - `UnknownParent` if `parent` is not in the tree
    /// - `DuplicateName` if `name` is taken
    /// - `NegativeTime` for a negative trigger delay or constraint duration
    pub fn add_node(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        role: DeviceRole,
        constraints: Constraints,
        trigger_delay: Instant,
    ) -> Result<NodeId, ScheduleError> {
        let name = name.into();
        if role == DeviceRole::RootClock {
            return Err(ScheduleError::InvalidRole {
                device: name,
                role,
                reason: "a tree has exactly one root clock, created by add_root_clock",
            });
        }
        let parent_role = self
            .node(parent)
            .map(DeviceNode::role)
            .ok_or(ScheduleError::UnknownParent { parent })?;
        if !parent_role.is_clock() {
            return Err(ScheduleError::InvalidRole {
                device: name,
                role,
                reason: "only clocks can drive other devices",
            });
        }
        if trigger_delay.is_negative() {
            return Err(ScheduleError::NegativeTime {
                device: name,
                field: "trigger_delay",
                instant: trigger_delay,
            });
        }
        self.check_name(&name)?;
        constraints.check(&name)?;

        let id = self.push_node(name, role, constraints, trigger_delay, Some(parent));
        if let Some(Some(p)) = self.nodes.get_mut(parent.index()) {
            p.children.push(id);
        }
        Ok(id)
    }

    fn check_name(&self, name: &str) -> Result<(), ScheduleError> {
        if self.names.contains_key(name) || self.waits.iter().any(|w| w.name == name) {
            return Err(ScheduleError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn push_node(
        &mut self,
        name: String,
        role: DeviceRole,
        constraints: Constraints,
        trigger_delay: Instant,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        debug!(device = %name, id = %id, role = %role, parent = ?parent, "Adding device");
        self.names.insert(name.clone(), id);
        self.nodes.push(Some(DeviceNode {
            id,
            name,
            role,
            constraints,
            trigger_delay,
            parent,
            children: Vec::new(),
            instructions: InstructionSequence::new(),
        }));
        self.revision += 1;
        id
    }

    /// Remove a device and everything it drives.
    ///
    /// # Errors
    ///
    /// - `UnknownDevice` if `id` is not in the tree
    /// - `InvalidRole` when asked to remove the root clock
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), ScheduleError> {
        let node = self.node(id).ok_or(ScheduleError::UnknownDevice { device: id })?;
        let parent = match node.parent {
            Some(p) => p,
            None => {
                return Err(ScheduleError::InvalidRole {
                    device: node.name.clone(),
                    role: node.role,
                    reason: "the root clock cannot be removed",
                })
            }
        };

        if let Some(Some(p)) = self.nodes.get_mut(parent.index()) {
            p.children.retain(|&c| c != id);
        }

        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(removed) = self.nodes.get_mut(next.index()).and_then(Option::take) {
                debug!(device = %removed.name, id = %next, "Removing device");
                self.names.remove(&removed.name);
                pending.extend(removed.children);
            }
        }
        self.revision += 1;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Instructions
    // -------------------------------------------------------------------------

    /// Add a timed instruction to a device, keeping its list time-ordered.
    ///
    /// # Errors
    ///
    /// - `UnknownDevice` if `device` is not in the tree
    /// - `NegativeTime` if `time` or `duration` is negative
    /// - `InvalidInstruction` if the payload does not fit the device or the
    ///   timing shape (static outputs only at zero on terminals, ramps need
    ///   a positive duration and at least one sample)
    /// - `DuplicateTime` if the instant is already occupied on the device
    pub fn add_instruction(
        &mut self,
        device: NodeId,
        time: Instant,
        payload: Payload,
        duration: Option<Instant>,
    ) -> Result<(), ScheduleError> {
        let node = self
            .nodes
            .get_mut(device.index())
            .and_then(Option::as_mut)
            .ok_or(ScheduleError::UnknownDevice { device })?;

        if time.is_negative() {
            return Err(ScheduleError::NegativeTime {
                device: node.name.clone(),
                field: "instruction time",
                instant: time,
            });
        }
        if let Some(d) = duration.as_ref().filter(|d| d.is_negative()) {
            return Err(ScheduleError::NegativeTime {
                device: node.name.clone(),
                field: "instruction duration",
                instant: d.clone(),
            });
        }
        if let Some(reason) = payload_shape_error(node.role, &time, &payload, duration.as_ref()) {
            return Err(ScheduleError::InvalidInstruction {
                device: node.device_ref(),
                instant: time,
                reason,
            });
        }

        let instruction = Instruction::new(time, payload, duration);
        if let Err(rejected) = node.instructions.insert(instruction) {
            return Err(ScheduleError::DuplicateTime {
                device: node.device_ref(),
                instant: rejected.time,
            });
        }
        self.revision += 1;
        Ok(())
    }

    /// Drop every instruction of a device.
    pub fn clear_instructions(&mut self, device: NodeId) -> Result<(), ScheduleError> {
        let node = self
            .nodes
            .get_mut(device.index())
            .and_then(Option::as_mut)
            .ok_or(ScheduleError::UnknownDevice { device })?;
        node.instructions.clear();
        self.revision += 1;
        Ok(())
    }

    /// Add an experiment-wide wait, executed by the root clock.
    ///
    /// # Errors
    ///
    /// - `InvalidRole` if the tree has no root clock yet
    /// - `NegativeTime` if `time` is negative
    /// - `DuplicateName` if `name` is taken by a device or another wait
    /// - `DuplicateTime` if another wait already sits at `time`
    pub fn add_wait(&mut self, name: impl Into<String>, time: Instant) -> Result<(), ScheduleError> {
        let name = name.into();
        let root = match self.root.and_then(|r| self.node(r)) {
            Some(root) => root.device_ref(),
            None => {
                return Err(ScheduleError::InvalidRole {
                    device: name,
                    role: DeviceRole::RootClock,
                    reason: "waits require a root clock",
                })
            }
        };
        if time.is_negative() {
            return Err(ScheduleError::NegativeTime {
                device: name,
                field: "wait time",
                instant: time,
            });
        }
        self.check_name(&name)?;

        match self.waits.binary_search_by(|w| w.time.cmp(&time)) {
            Ok(_) => Err(ScheduleError::DuplicateTime {
                device: root,
                instant: time,
            }),
            Err(pos) => {
                debug!(wait = %name, time = %time, "Adding wait");
                self.waits.insert(pos, Wait { name, time });
                self.revision += 1;
                Ok(())
            }
        }
    }

    pub fn clear_waits(&mut self) {
        self.waits.clear();
        self.revision += 1;
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&DeviceNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Look up a device id by name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn root_params(&self) -> Option<&RootClockParams> {
        self.root_params.as_ref()
    }

    /// Waits in time order.
    pub fn waits(&self) -> &[Wait] {
        &self.waits
    }

    /// Monotonic mutation counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of live devices.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Live devices in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &DeviceNode> {
        self.nodes.iter().flatten()
    }

    pub fn device_ref(&self, id: NodeId) -> Option<DeviceRef> {
        self.node(id).map(DeviceNode::device_ref)
    }

    /// Root first, then breadth-first with children in insertion order.
    ///
    /// Every device appears after its parent, so iterating the reverse
    /// visits children before their parents.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.len());
        let mut queue: VecDeque<NodeId> = self.root.into_iter().collect();
        while let Some(id) = queue.pop_front() {
            if let Some(node) = self.node(id) {
                order.push(id);
                queue.extend(node.children.iter().copied());
            }
        }
        order
    }

    /// Whether `schedule` was resolved from the tree as it is now.
    pub fn is_current(&self, schedule: &ResolvedSchedule) -> bool {
        schedule.revision() == self.revision
    }
}

/// Why a payload cannot be placed on a device, if it cannot.
fn payload_shape_error(
    role: DeviceRole,
    time: &Instant,
    payload: &Payload,
    duration: Option<&Instant>,
) -> Option<&'static str> {
    match payload {
        Payload::Static { .. } if role != DeviceRole::Terminal => {
            Some("static outputs belong to terminal devices")
        }
        Payload::Static { .. } if !time.is_zero() => Some("static outputs are set at time zero"),
        Payload::Static { .. } if duration.is_some() => {
            Some("static outputs last the whole experiment and take no duration")
        }
        Payload::Ramp { .. } if role != DeviceRole::Terminal => {
            Some("ramps belong to terminal devices")
        }
        Payload::Ramp { samples: 0, .. } => Some("a ramp needs at least one sample"),
        Payload::Ramp { .. } if !duration.is_some_and(Instant::is_positive) => {
            Some("a ramp needs a positive duration")
        }
        _ => None,
    }
}
