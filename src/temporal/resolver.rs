// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Turns a [`DeviceTree`] into a [`ResolvedSchedule`].
//!
//! Resolution runs in two passes over the tree's topological order:
//!
//! 1. **Requirements** (leaves → root): every clock collects the instants
//!    at which its children and its own instructions need an edge, shifted
//!    earlier by each child's trigger delay. A subordinate clock's first
//!    tick becomes a single start-trigger requirement on its parent. The
//!    distinct required instants become the clock's ticks.
//! 2. **Assignment** (root → leaves): every subordinate clock and every
//!    terminal output is bound to the parent tick that fires it.
//!
//! The result is handed to the [`Validator`] before it is returned, so a
//! caller never sees a schedule that violates a device constraint.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::{debug, info};

use super::constraints::{Constraints, DeviceNode, DeviceRef, DeviceRole, NodeId};
use super::schedule::{BoundOutput, ClockTrigger, DeviceSchedule, ResolvedSchedule, Timeline};
use super::sequence::Payload;
use super::tree::DeviceTree;
use super::types::Instant;
use super::validator::Validator;
use crate::config::ResolverConfig;
use crate::error::ScheduleError;

/// An instant at which a clock must emit an edge, and who needs it.
#[derive(Debug, Clone)]
struct Requirement {
    instant: Instant,
    origin: NodeId,
}

/// Common limits of one device, with the devices that set them.
#[derive(Debug, Clone)]
struct Limits {
    min_period: Instant,
    period_limited_by: NodeId,
    min_trigger: Instant,
    trigger_limited_by: NodeId,
}

/// Computes hardware-valid schedules.
#[derive(Debug, Clone)]
pub struct Resolver {
    default_max_instructions: Option<u64>,
    max_edges_per_device: u64,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

impl Resolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            default_max_instructions: config.default_max_instructions,
            max_edges_per_device: config.max_edges_per_device,
        }
    }

    /// Resolve `tree` into an immutable schedule.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScheduleError`] found. No partial schedule is
    /// ever produced.
    pub fn resolve(&self, tree: &DeviceTree) -> Result<ResolvedSchedule, ScheduleError> {
        let (root_id, params) = match (tree.root(), tree.root_params()) {
            (Some(id), Some(params)) => (id, params),
            _ => {
                return Err(ScheduleError::InvalidRole {
                    device: String::new(),
                    role: DeviceRole::RootClock,
                    reason: "the tree has no root clock",
                })
            }
        };

        let order = tree.topological_order();
        debug!(devices = order.len(), revision = tree.revision(), "Resolving device tree");

        for node in order.iter().filter_map(|&id| tree.node(id)) {
            self.check_edge_budget(node)?;
        }
        let limits = self.common_limits(tree, &order, &params.granularity)?;

        // Requirement pass: children before parents
        debug!("Requirement pass");
        let mut plans: HashMap<NodeId, Vec<Instant>> = HashMap::new();
        for &id in order.iter().rev() {
            let Some(node) = tree.node(id) else { continue };
            if !node.role().is_clock() {
                continue;
            }
            let requirements = self.requirements(tree, node, &plans)?;
            let ticks = self.materialize(tree, node, requirements, &limits[&id], &params.granularity)?;
            if node.role() == DeviceRole::RootClock {
                check_wait_dead_time(tree, node, &ticks, &params.wait_delay)?;
            }
            debug!(clock = %node.name(), ticks = ticks.len(), "Clock ticks materialized");
            plans.insert(id, ticks);
        }

        // Assignment pass: parents before children
        debug!("Assignment pass");
        let mut devices = IndexMap::with_capacity(order.len());
        for &id in &order {
            let Some(node) = tree.node(id) else { continue };
            let parent_ticks = node
                .parent()
                .and_then(|p| plans.get(&p))
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let timeline = if node.role().is_clock() {
                let ticks = plans.get(&id).cloned().unwrap_or_default();
                let trigger = match node.role() {
                    DeviceRole::RootClock => None,
                    _ => bind_trigger(node, &ticks, parent_ticks)?,
                };
                // A clock executes its own instructions on its own ticks
                let instructions = bind_outputs(node, &ticks, &Instant::zero())?;
                Timeline::Clock {
                    trigger,
                    ticks,
                    instructions,
                }
            } else {
                let outputs = bind_outputs(node, parent_ticks, node.trigger_delay())?;
                Timeline::Terminal { outputs }
            };

            let mut constraints = node.constraints().clone();
            if constraints.max_instructions.is_none() {
                constraints.max_instructions = self.default_max_instructions;
            }
            check_capacity(node, &constraints, &timeline)?;

            let limit = limits.get(&id).cloned().unwrap_or_else(|| Limits {
                min_period: constraints.min_period.clone(),
                period_limited_by: id,
                min_trigger: constraints.min_trigger.clone(),
                trigger_limited_by: id,
            });

            devices.insert(
                id,
                DeviceSchedule {
                    id,
                    name: node.name().to_string(),
                    role: node.role(),
                    parent: node.parent(),
                    constraints,
                    trigger_delay: node.trigger_delay().clone(),
                    effective_min_period: limit.min_period,
                    limiting_device: limit.period_limited_by,
                    min_trigger: limit.min_trigger,
                    trigger_limiting_device: limit.trigger_limited_by,
                    timeline,
                },
            );
        }
        // Topological order groups by depth; declaration order is id order
        devices.sort_keys();

        let schedule = ResolvedSchedule::new(
            tree.revision(),
            params.granularity.clone(),
            params.wait_delay.clone(),
            tree.waits().to_vec(),
            devices,
        );
        Validator::validate(&schedule)?;

        info!(
            devices = schedule.len(),
            root_ticks = schedule.ticks(root_id).map_or(0, <[Instant]>::len),
            revision = schedule.revision(),
            "Schedule resolved"
        );
        Ok(schedule)
    }

    /// Refuse a device whose declared instructions need more edges than it
    /// can hold, before any edge is materialized.
    fn check_edge_budget(&self, node: &DeviceNode) -> Result<(), ScheduleError> {
        let declared = node.instructions().edge_count();
        let limit = node
            .constraints()
            .max_instructions
            .or(self.default_max_instructions)
            .map_or(self.max_edges_per_device, |l| l.min(self.max_edges_per_device));
        if declared > limit {
            return Err(ScheduleError::MaxInstructionsExceeded {
                device: node.device_ref(),
                limit,
                count: declared,
            });
        }
        Ok(())
    }

    /// Effective minimum period and trigger width of every device, with the
    /// devices that set them.
    ///
    /// A clock cannot tick faster than any terminal it drives directly, and
    /// its pulses must be long enough for every device it drives directly.
    /// A clock's period is rounded up to the root granularity.
    fn common_limits(
        &self,
        tree: &DeviceTree,
        order: &[NodeId],
        granularity: &Instant,
    ) -> Result<HashMap<NodeId, Limits>, ScheduleError> {
        let mut limits = HashMap::with_capacity(order.len());
        for &id in order {
            let Some(node) = tree.node(id) else { continue };
            let mut limit = Limits {
                min_period: node.constraints().min_period.clone(),
                period_limited_by: id,
                min_trigger: node.constraints().min_trigger.clone(),
                trigger_limited_by: id,
            };
            if node.role().is_clock() {
                for child in node.children().iter().filter_map(|&c| tree.node(c)) {
                    let constraints = child.constraints();
                    if child.role() == DeviceRole::Terminal
                        && constraints.min_period > limit.min_period
                    {
                        limit.min_period = constraints.min_period.clone();
                        limit.period_limited_by = child.id();
                    }
                    if constraints.min_trigger > limit.min_trigger {
                        limit.min_trigger = constraints.min_trigger.clone();
                        limit.trigger_limited_by = child.id();
                    }
                }
                limit.min_period = limit.min_period.round_up_to(granularity)?;
                debug!(
                    clock = %node.name(),
                    min_period = %limit.min_period,
                    limited_by = %limit.period_limited_by,
                    min_trigger = %limit.min_trigger,
                    trigger_limited_by = %limit.trigger_limited_by,
                    "Clock limits established"
                );
            }
            limits.insert(id, limit);
        }
        Ok(limits)
    }

    /// Edges `clock` must emit: its own instructions, waits on the root,
    /// then each child in insertion order.
    fn requirements(
        &self,
        tree: &DeviceTree,
        clock: &DeviceNode,
        plans: &HashMap<NodeId, Vec<Instant>>,
    ) -> Result<Vec<Requirement>, ScheduleError> {
        let mut requirements = Vec::new();

        for instruction in clock.instructions() {
            for instant in instruction.edge_instants()? {
                requirements.push(Requirement {
                    instant,
                    origin: clock.id(),
                });
            }
        }
        if clock.role() == DeviceRole::RootClock {
            requirements.extend(tree.waits().iter().map(|w| Requirement {
                instant: w.time.clone(),
                origin: clock.id(),
            }));
        }

        for child in clock.children().iter().filter_map(|&c| tree.node(c)) {
            let delay = child.trigger_delay();
            match child.role() {
                DeviceRole::Terminal => {
                    for instruction in child.instructions() {
                        for instant in instruction.edge_instants()? {
                            requirements.push(Requirement {
                                instant: shifted(child, instant, delay)?,
                                origin: child.id(),
                            });
                        }
                    }
                }
                _ => {
                    let first = plans.get(&child.id()).and_then(|ticks| ticks.first());
                    if let Some(first) = first {
                        requirements.push(Requirement {
                            instant: shifted(child, first.clone(), delay)?,
                            origin: child.id(),
                        });
                    }
                }
            }
        }
        Ok(requirements)
    }

    /// Sort requirements into distinct ticks and enforce the clock's limits.
    ///
    /// Ties between two edges that are too close go to the device declared
    /// first; the other is reported. Two edges are too close when they fall
    /// within the minimum period, or leave no room for a high and a low
    /// pulse of the minimum trigger width.
    fn materialize(
        &self,
        tree: &DeviceTree,
        clock: &DeviceNode,
        mut requirements: Vec<Requirement>,
        limits: &Limits,
        granularity: &Instant,
    ) -> Result<Vec<Instant>, ScheduleError> {
        requirements.sort_by(|a, b| a.instant.cmp(&b.instant).then(a.origin.cmp(&b.origin)));

        let device_ref = |id: NodeId| {
            tree.device_ref(id)
                .unwrap_or_else(|| DeviceRef::new(id, String::new()))
        };

        let min_spacing = &limits.min_trigger * 2;

        // (tick, first origin to claim it)
        let mut ticks: Vec<(Instant, NodeId)> = Vec::new();
        for req in requirements {
            if let Some((last, owner)) = ticks.last() {
                if *last == req.instant {
                    continue;
                }
                let gap = &req.instant - last;
                if gap < limits.min_period || gap < min_spacing {
                    let (loser, loser_at, winner, winner_at) = if req.origin > *owner {
                        (req.origin, req.instant.clone(), *owner, last.clone())
                    } else {
                        (*owner, last.clone(), req.origin, req.instant.clone())
                    };
                    let (clock, device, conflicting_device) =
                        (clock.device_ref(), device_ref(loser), device_ref(winner));
                    return Err(if gap < limits.min_period {
                        ScheduleError::MinPeriodViolated {
                            clock,
                            device,
                            instant: loser_at,
                            conflicting_device,
                            conflicting_instant: winner_at,
                            min_period: limits.min_period.clone(),
                        }
                    } else {
                        ScheduleError::TriggerWidthViolated {
                            clock,
                            device,
                            instant: loser_at,
                            conflicting_device,
                            conflicting_instant: winner_at,
                            min_trigger: limits.min_trigger.clone(),
                        }
                    });
                }
            }
            if req.instant.whole_multiples_of(granularity).is_err() {
                return Err(ScheduleError::NonRepresentableInstant {
                    device: device_ref(req.origin),
                    instant: req.instant,
                    granularity: granularity.clone(),
                });
            }
            ticks.push((req.instant, req.origin));
        }

        Ok(ticks.into_iter().map(|(t, _)| t).collect())
    }
}

/// Convenience wrapper around [`Resolver::resolve`] with default settings.
pub fn resolve(tree: &DeviceTree) -> Result<ResolvedSchedule, ScheduleError> {
    Resolver::default().resolve(tree)
}

/// `instant - delay`, rejected if it would fall before the experiment start.
fn shifted(device: &DeviceNode, instant: Instant, delay: &Instant) -> Result<Instant, ScheduleError> {
    let required = &instant - delay;
    if required.is_negative() {
        return Err(ScheduleError::UnalignedInstruction {
            device: device.device_ref(),
            instant,
            required_tick: required,
        });
    }
    Ok(required)
}

/// No root edge may fall strictly inside `(wait, wait + wait_delay)`.
fn check_wait_dead_time(
    tree: &DeviceTree,
    root: &DeviceNode,
    ticks: &[Instant],
    wait_delay: &Instant,
) -> Result<(), ScheduleError> {
    for wait in tree.waits() {
        let resume_at = &wait.time + wait_delay;
        if let Some(tick) = ticks.iter().find(|t| **t > wait.time && **t < resume_at) {
            return Err(ScheduleError::WaitDelayViolated {
                clock: root.device_ref(),
                wait: wait.name.clone(),
                wait_instant: wait.time.clone(),
                instant: tick.clone(),
                resume_at,
            });
        }
    }
    Ok(())
}

/// Parent tick that starts a subordinate clock, if the clock ticks at all.
fn bind_trigger(
    clock: &DeviceNode,
    ticks: &[Instant],
    parent_ticks: &[Instant],
) -> Result<Option<ClockTrigger>, ScheduleError> {
    let Some(first) = ticks.first() else {
        return Ok(None);
    };
    let at = first - clock.trigger_delay();
    match parent_ticks.binary_search(&at) {
        Ok(tick) => Ok(Some(ClockTrigger { tick, at })),
        Err(_) => Err(ScheduleError::UnalignedInstruction {
            device: clock.device_ref(),
            instant: first.clone(),
            required_tick: at,
        }),
    }
}

/// Bind every output of a device to the tick at `time - delay`.
fn bind_outputs(
    device: &DeviceNode,
    ticks: &[Instant],
    delay: &Instant,
) -> Result<Vec<BoundOutput>, ScheduleError> {
    let mut outputs = Vec::new();
    for (index, instruction) in device.instructions().iter().enumerate() {
        let busy_until = instruction.end_time();
        if !instruction.payload.needs_clock() {
            outputs.push(BoundOutput {
                time: instruction.time.clone(),
                payload: instruction.payload.clone(),
                tick: None,
                instruction: index,
                sample: None,
                busy_until,
            });
            continue;
        }

        let is_ramp = matches!(instruction.payload, Payload::Ramp { .. });
        for (sample, time) in instruction.edge_instants()?.into_iter().enumerate() {
            let required = &time - delay;
            let tick = ticks.binary_search(&required).map_err(|_| {
                ScheduleError::UnalignedInstruction {
                    device: device.device_ref(),
                    instant: time.clone(),
                    required_tick: required.clone(),
                }
            })?;
            outputs.push(BoundOutput {
                time,
                payload: instruction.payload.clone(),
                tick: Some(tick),
                instruction: index,
                sample: is_ramp.then_some(sample as u64),
                busy_until: busy_until.clone(),
            });
        }
    }
    Ok(outputs)
}

/// Ticks of a clock or outputs of a terminal must fit the device memory.
fn check_capacity(
    node: &DeviceNode,
    constraints: &Constraints,
    timeline: &Timeline,
) -> Result<(), ScheduleError> {
    let Some(limit) = constraints.max_instructions else {
        return Ok(());
    };
    let count = match timeline {
        Timeline::Clock { ticks, .. } => ticks.len(),
        Timeline::Terminal { outputs } => outputs.len(),
    } as u64;
    if count > limit {
        return Err(ScheduleError::MaxInstructionsExceeded {
            device: node.device_ref(),
            limit,
            count,
        });
    }
    Ok(())
}
