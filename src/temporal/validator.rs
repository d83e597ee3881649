// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Independent re-check of a [`ResolvedSchedule`].
//!
//! The validator looks at the schedule alone, using the constraint copies
//! it carries. It never consults the tree, so it also catches schedules
//! that were built or modified outside the resolver.

use tracing::debug;

use super::constraints::{DeviceRef, DeviceRole};
use super::schedule::{BoundOutput, DeviceSchedule, ResolvedSchedule};
use super::types::Instant;
use crate::error::ScheduleError;

/// Stateless schedule checker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    /// Check every invariant and return the first violation.
    pub fn validate(schedule: &ResolvedSchedule) -> Result<(), ScheduleError> {
        match Self::violations(schedule).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// List all violations, devices in declaration order.
    ///
    /// Returns an empty list for a valid schedule.
    pub fn violations(schedule: &ResolvedSchedule) -> Vec<ScheduleError> {
        let mut errors = Vec::new();
        for device in schedule.iter() {
            let parent = device.parent.and_then(|p| schedule.device(p));
            if let Some(ticks) = device.ticks() {
                check_clock(schedule, device, ticks, parent, &mut errors);
            } else {
                check_terminal(device, parent, &mut errors);
            }
        }
        if let Some(root) = schedule.root() {
            check_waits(schedule, root, &mut errors);
        }
        debug!(violations = errors.len(), "Schedule validated");
        errors
    }
}

fn check_clock(
    schedule: &ResolvedSchedule,
    clock: &DeviceSchedule,
    ticks: &[Instant],
    parent: Option<&DeviceSchedule>,
    errors: &mut Vec<ScheduleError>,
) {
    let me = clock.device_ref();

    for tick in ticks {
        if tick.is_negative() || tick.whole_multiples_of(schedule.granularity()).is_err() {
            errors.push(ScheduleError::NonRepresentableInstant {
                device: me.clone(),
                instant: tick.clone(),
                granularity: schedule.granularity().clone(),
            });
        }
    }

    let min_spacing = &clock.min_trigger * 2;
    for pair in ticks.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if cur <= prev {
            errors.push(ScheduleError::NonMonotonic {
                device: me.clone(),
                instant: cur.clone(),
                previous: prev.clone(),
            });
        } else if cur - prev < clock.effective_min_period {
            errors.push(ScheduleError::MinPeriodViolated {
                clock: me.clone(),
                device: me.clone(),
                instant: cur.clone(),
                conflicting_device: me.clone(),
                conflicting_instant: prev.clone(),
                min_period: clock.effective_min_period.clone(),
            });
        } else if cur - prev < min_spacing {
            errors.push(ScheduleError::TriggerWidthViolated {
                clock: me.clone(),
                device: me.clone(),
                instant: cur.clone(),
                conflicting_device: me.clone(),
                conflicting_instant: prev.clone(),
                min_trigger: clock.min_trigger.clone(),
            });
        }
    }

    // The clock's own instructions sit on its own ticks and settle like any other
    let own = clock.clock_instructions().unwrap_or(&[]);
    for output in own.iter().filter(|o| o.payload.needs_clock()) {
        if output.tick.and_then(|i| ticks.get(i)) != Some(&output.time) {
            errors.push(ScheduleError::UnalignedInstruction {
                device: me.clone(),
                instant: output.time.clone(),
                required_tick: output.time.clone(),
            });
        }
    }
    check_settling(&me, own, &clock.constraints.settling_time, errors);

    check_count(&me, clock.constraints.max_instructions, ticks.len(), errors);

    if clock.role == DeviceRole::RootClock {
        return;
    }
    let Some(first) = ticks.first() else {
        return;
    };
    let required = first - &clock.trigger_delay;
    let parent_ticks = parent.and_then(DeviceSchedule::ticks).unwrap_or(&[]);
    let bound = clock.trigger().is_some_and(|trigger| {
        trigger.at == required && parent_ticks.get(trigger.tick) == Some(&trigger.at)
    });
    if !bound {
        errors.push(ScheduleError::UnalignedInstruction {
            device: me,
            instant: first.clone(),
            required_tick: required,
        });
    }
}

fn check_terminal(
    terminal: &DeviceSchedule,
    parent: Option<&DeviceSchedule>,
    errors: &mut Vec<ScheduleError>,
) {
    let me = terminal.device_ref();
    let outputs = terminal.outputs().unwrap_or(&[]);
    let parent_ticks = parent.and_then(DeviceSchedule::ticks).unwrap_or(&[]);
    let parent_ref = parent.map_or_else(|| me.clone(), DeviceSchedule::device_ref);

    // Every clocked output fires on the parent tick one trigger delay earlier
    for output in outputs.iter().filter(|o| o.payload.needs_clock()) {
        let required = &output.time - &terminal.trigger_delay;
        let fired_by = output.tick.and_then(|i| parent_ticks.get(i));
        if fired_by != Some(&required) {
            errors.push(ScheduleError::UnalignedInstruction {
                device: me.clone(),
                instant: output.time.clone(),
                required_tick: required,
            });
        }
    }

    check_settling(&me, outputs, &terminal.constraints.settling_time, errors);

    let clocked: Vec<_> = outputs.iter().filter(|o| o.payload.needs_clock()).collect();
    for pair in clocked.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        if cur.time <= prev.time {
            errors.push(ScheduleError::NonMonotonic {
                device: me.clone(),
                instant: cur.time.clone(),
                previous: prev.time.clone(),
            });
        } else if &cur.time - &prev.time < terminal.constraints.min_period {
            errors.push(ScheduleError::MinPeriodViolated {
                clock: parent_ref.clone(),
                device: me.clone(),
                instant: cur.time.clone(),
                conflicting_device: me.clone(),
                conflicting_instant: prev.time.clone(),
                min_period: terminal.constraints.min_period.clone(),
            });
        }
    }

    check_count(&me, terminal.constraints.max_instructions, outputs.len(), errors);
}

/// Each instruction starts once the previous one has ended and settled.
fn check_settling(
    device: &DeviceRef,
    outputs: &[BoundOutput],
    settling: &Instant,
    errors: &mut Vec<ScheduleError>,
) {
    let clocked: Vec<_> = outputs.iter().filter(|o| o.payload.needs_clock()).collect();
    let mut instruction_start = clocked.first().map(|o| o.time.clone());
    for pair in clocked.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        if cur.instruction == prev.instruction {
            continue;
        }
        let available_at = &prev.busy_until + settling;
        if cur.time < available_at {
            errors.push(ScheduleError::SettlingTimeViolated {
                device: device.clone(),
                instant: cur.time.clone(),
                previous: instruction_start.clone().unwrap_or_else(|| prev.time.clone()),
                available_at,
            });
        }
        instruction_start = Some(cur.time.clone());
    }
}

fn check_count(
    device: &DeviceRef,
    limit: Option<u64>,
    count: usize,
    errors: &mut Vec<ScheduleError>,
) {
    if let Some(limit) = limit {
        let count = count as u64;
        if count > limit {
            errors.push(ScheduleError::MaxInstructionsExceeded {
                device: device.clone(),
                limit,
                count,
            });
        }
    }
}

/// The root ticks at every wait and stays silent during its dead time.
fn check_waits(schedule: &ResolvedSchedule, root: &DeviceSchedule, errors: &mut Vec<ScheduleError>) {
    let ticks = root.ticks().unwrap_or(&[]);
    for wait in schedule.waits() {
        if ticks.binary_search(&wait.time).is_err() {
            errors.push(ScheduleError::UnalignedInstruction {
                device: root.device_ref(),
                instant: wait.time.clone(),
                required_tick: wait.time.clone(),
            });
        }
        let resume_at = &wait.time + schedule.wait_delay();
        for tick in ticks.iter().filter(|t| **t > wait.time && **t < resume_at) {
            errors.push(ScheduleError::WaitDelayViolated {
                clock: root.device_ref(),
                wait: wait.name.clone(),
                wait_instant: wait.time.clone(),
                instant: tick.clone(),
                resume_at: resume_at.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::temporal::schedule::Timeline;
    use crate::temporal::{resolve, Constraints, DeviceTree, NodeId, Payload, RootClockParams};
    use crate::test_utils::{add_clock, add_terminal, ns, us};

    /// root → clock (delay 100ns) → ao (delay 20ns), plus a wait.
    fn resolved() -> (ResolvedSchedule, NodeId, NodeId, NodeId) {
        let mut tree = DeviceTree::new();
        let root = tree
            .add_root_clock(
                "root",
                Constraints::new(ns(100)),
                RootClockParams::new(ns(10)).with_wait_delay(ns(500)),
            )
            .unwrap();
        let clock = add_clock(&mut tree, root, "clock", ns(100), ns(100));
        let ao = tree
            .add_node(
                clock,
                "ao",
                DeviceRole::Terminal,
                Constraints::new(ns(200)).with_settling_time(ns(100)),
                ns(20),
            )
            .unwrap();
        tree.add_instruction(ao, us(1), Payload::constant(0), None).unwrap();
        tree.add_instruction(ao, us(2), Payload::ramp("lin", 2), Some(us(1)))
            .unwrap();
        tree.add_wait("pause", us(10)).unwrap();
        (resolve(&tree).unwrap(), root, clock, ao)
    }

    fn ticks_mut(schedule: &mut ResolvedSchedule, id: NodeId) -> &mut Vec<Instant> {
        match &mut schedule.device_mut(id).unwrap().timeline {
            Timeline::Clock { ticks, .. } => ticks,
            Timeline::Terminal { .. } => panic!("not a clock"),
        }
    }

    // =========================================================================
    // Valid schedules
    // =========================================================================

    #[test]
    fn test_resolved_schedule_is_valid() {
        let (schedule, ..) = resolved();
        assert!(Validator::violations(&schedule).is_empty());
        assert!(Validator::validate(&schedule).is_ok());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let (schedule, ..) = resolved();
        let before = schedule.clone();
        assert!(Validator::validate(&schedule).is_ok());
        assert!(Validator::validate(&schedule).is_ok());
        assert_eq!(schedule, before);
    }

    #[test]
    fn test_empty_terminal_is_valid() {
        let mut tree = DeviceTree::new();
        let root = tree
            .add_root_clock("root", Constraints::default(), RootClockParams::new(ns(1)))
            .unwrap();
        add_terminal(&mut tree, root, "idle", Instant::zero(), Instant::zero());
        let schedule = resolve(&tree).unwrap();
        assert!(Validator::violations(&schedule).is_empty());
    }

    // =========================================================================
    // Corrupted schedules
    // =========================================================================

    #[test]
    fn test_detects_non_monotonic_ticks() {
        let (mut schedule, _, clock, _) = resolved();
        ticks_mut(&mut schedule, clock).reverse();
        let kinds: Vec<_> = Validator::violations(&schedule).iter().map(|e| e.kind()).collect();
        assert!(kinds.contains(&ErrorKind::NonMonotonic));
    }

    #[test]
    fn test_detects_tight_ticks() {
        let (mut schedule, _, clock, _) = resolved();
        let ticks = ticks_mut(&mut schedule, clock);
        let squeezed = &ticks[0] + &ns(50);
        ticks.insert(1, squeezed);
        let err = Validator::validate(&schedule).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MinPeriodViolated);
    }

    #[test]
    fn test_detects_ticks_too_close_for_trigger_pulses() {
        let (mut schedule, _, clock, _) = resolved();
        // Clock ticks are 500ns apart at the closest
        schedule.device_mut(clock).unwrap().min_trigger = ns(600);
        let err = Validator::validate(&schedule).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TriggerWidthViolated);
        assert_eq!(err.devices()[0].id, clock);
    }

    #[test]
    fn test_detects_unrepresentable_tick() {
        let (mut schedule, root, _, _) = resolved();
        ticks_mut(&mut schedule, root).push(us(20) + Instant::picos(1));
        let err = Validator::validate(&schedule).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonRepresentableInstant);
        assert_eq!(err.devices()[0].id, root);
    }

    #[test]
    fn test_detects_broken_trigger() {
        let (mut schedule, _, clock, _) = resolved();
        if let Timeline::Clock { trigger, .. } = &mut schedule.device_mut(clock).unwrap().timeline {
            *trigger = None;
        }
        let err = Validator::validate(&schedule).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnalignedInstruction);
        assert_eq!(err.devices()[0].id, clock);
    }

    #[test]
    fn test_detects_output_on_wrong_tick() {
        let (mut schedule, _, _, ao) = resolved();
        if let Timeline::Terminal { outputs } = &mut schedule.device_mut(ao).unwrap().timeline {
            outputs[0].tick = Some(1);
        }
        let err = Validator::validate(&schedule).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::UnalignedInstruction {
                device: DeviceRef::new(ao, "ao"),
                instant: us(1),
                required_tick: ns(980),
            }
        );
    }

    #[test]
    fn test_detects_settling_violation() {
        let (mut schedule, _, _, ao) = resolved();
        if let Timeline::Terminal { outputs } = &mut schedule.device_mut(ao).unwrap().timeline {
            outputs[0].busy_until = ns(1_950);
        }
        let err = Validator::validate(&schedule).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::SettlingTimeViolated {
                device: DeviceRef::new(ao, "ao"),
                instant: us(2),
                previous: us(1),
                available_at: ns(2_050),
            }
        );
    }

    /// Root clock with two own instructions, 1us apart.
    fn resolved_with_clock_instructions() -> (ResolvedSchedule, NodeId) {
        let mut tree = DeviceTree::new();
        let root = tree
            .add_root_clock("root", Constraints::new(ns(100)), RootClockParams::new(ns(10)))
            .unwrap();
        tree.add_instruction(root, us(1), Payload::constant(0), None).unwrap();
        tree.add_instruction(root, us(2), Payload::constant(1), None).unwrap();
        (resolve(&tree).unwrap(), root)
    }

    fn clock_instructions_mut(schedule: &mut ResolvedSchedule, id: NodeId) -> &mut Vec<BoundOutput> {
        match &mut schedule.device_mut(id).unwrap().timeline {
            Timeline::Clock { instructions, .. } => instructions,
            Timeline::Terminal { .. } => panic!("not a clock"),
        }
    }

    #[test]
    fn test_detects_clock_instruction_settling_violation() {
        let (mut schedule, root) = resolved_with_clock_instructions();
        assert!(Validator::validate(&schedule).is_ok());

        clock_instructions_mut(&mut schedule, root)[0].busy_until = ns(2_500);
        let err = Validator::validate(&schedule).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::SettlingTimeViolated {
                device: DeviceRef::new(root, "root"),
                instant: us(2),
                previous: us(1),
                available_at: ns(2_500),
            }
        );
    }

    #[test]
    fn test_detects_clock_instruction_off_tick() {
        let (mut schedule, root) = resolved_with_clock_instructions();
        clock_instructions_mut(&mut schedule, root)[1].tick = Some(0);
        let err = Validator::validate(&schedule).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnalignedInstruction);
        assert_eq!(err.instants()[0], &us(2));
    }

    #[test]
    fn test_detects_capacity_overflow() {
        let (mut schedule, _, clock, _) = resolved();
        schedule.device_mut(clock).unwrap().constraints.max_instructions = Some(1);
        let err = Validator::validate(&schedule).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::MaxInstructionsExceeded {
                device: DeviceRef::new(clock, "clock"),
                limit: 1,
                count: 3,
            }
        );
    }

    #[test]
    fn test_detects_missing_wait_tick_and_dead_time() {
        let (mut schedule, root, _, _) = resolved();
        let ticks = ticks_mut(&mut schedule, root);
        ticks.retain(|t| *t != us(10));
        ticks.push(ns(10_200));
        let kinds: Vec<_> = Validator::violations(&schedule).iter().map(|e| e.kind()).collect();
        assert!(kinds.contains(&ErrorKind::UnalignedInstruction));
        assert!(kinds.contains(&ErrorKind::WaitDelayViolated));
    }

    #[test]
    fn test_violations_lists_every_problem() {
        let (mut schedule, root, clock, _) = resolved();
        schedule.device_mut(clock).unwrap().constraints.max_instructions = Some(0);
        ticks_mut(&mut schedule, root).push(us(20) + Instant::picos(3));
        let violations = Validator::violations(&schedule);
        assert!(violations.len() >= 2);
        // Declaration order: the root comes first
        assert_eq!(violations[0].devices()[0].id, root);
    }
}
