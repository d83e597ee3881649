// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Timed instructions and the per-device ordered instruction sequence.
//!
//! [`Instruction`] is a single timed event on one device. The core never
//! interprets a [`Payload`] beyond what its shape implies for timing: a
//! constant needs one clock edge, a ramp needs one edge per sample, and a
//! static output needs none.

use serde::{Deserialize, Serialize};

use super::types::Instant;
use crate::error::ScheduleError;

/// What an instruction does, as far as the timing core is concerned.
///
/// Values are opaque JSON so that unit conversion and evaluation stay with
/// the hardware programming layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Set an output to a value on one clock edge.
    Constant { value: serde_json::Value },
    /// Evaluate `function` over the instruction's duration, on `samples`
    /// equally spaced clock edges starting at the instruction time.
    Ramp { function: String, samples: u64 },
    /// Hold a value for the whole experiment; needs no clock.
    Static { value: serde_json::Value },
}

impl Payload {
    pub fn constant(value: impl Into<serde_json::Value>) -> Self {
        Payload::Constant {
            value: value.into(),
        }
    }

    pub fn ramp(function: impl Into<String>, samples: u64) -> Self {
        Payload::Ramp {
            function: function.into(),
            samples,
        }
    }

    pub fn static_value(value: impl Into<serde_json::Value>) -> Self {
        Payload::Static {
            value: value.into(),
        }
    }

    /// Whether executing this payload requires edges from a driving clock.
    pub fn needs_clock(&self) -> bool {
        !matches!(self, Payload::Static { .. })
    }
}

/// A single timed event on one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub time: Instant,
    pub payload: Payload,
    #[serde(default)]
    pub duration: Option<Instant>,
}

impl Instruction {
    pub fn new(time: Instant, payload: Payload, duration: Option<Instant>) -> Self {
        Self {
            time,
            payload,
            duration,
        }
    }

    /// Instant at which the device is done executing this instruction.
    pub fn end_time(&self) -> Instant {
        match &self.duration {
            Some(d) => &self.time + d,
            None => self.time.clone(),
        }
    }

    /// The instants at which this instruction needs a clock edge, in order.
    ///
    /// # Errors
    ///
    /// Returns `NonIntegerDivision` for a ramp with zero samples. The tree
    /// rejects such ramps on insertion.
    pub fn edge_instants(&self) -> Result<Vec<Instant>, ScheduleError> {
        match &self.payload {
            Payload::Static { .. } => Ok(Vec::new()),
            Payload::Constant { .. } => Ok(vec![self.time.clone()]),
            Payload::Ramp { samples, .. } => {
                let duration = self.duration.clone().unwrap_or_default();
                let period = duration.div_exact(*samples)?;
                Ok((0..*samples).map(|k| &self.time + &(&period * k)).collect())
            }
        }
    }
}

/// Time-ordered instructions of one device.
///
/// Insertion keeps the sequence sorted and refuses a second instruction
/// at an already occupied instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionSequence {
    instructions: Vec<Instruction>,
}

impl InstructionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping time order.
    ///
    /// Returns the insertion index, or `Err(instruction)` untouched if the
    /// instant is already occupied.
    pub fn insert(&mut self, instruction: Instruction) -> Result<usize, Instruction> {
        match self
            .instructions
            .binary_search_by(|i| i.time.cmp(&instruction.time))
        {
            Ok(_) => Err(instruction),
            Err(pos) => {
                self.instructions.insert(pos, instruction);
                Ok(pos)
            }
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn clear(&mut self) {
        self.instructions.clear();
    }

    /// Total number of clock edges these instructions need, saturating at
    /// `u64::MAX`.
    ///
    /// Cheap to compute, so capacity can be checked before any edge is
    /// materialized.
    pub fn edge_count(&self) -> u64 {
        self.instructions
            .iter()
            .map(|i| match &i.payload {
                Payload::Static { .. } => 0,
                Payload::Constant { .. } => 1,
                Payload::Ramp { samples, .. } => *samples,
            })
            .fold(0, u64::saturating_add)
    }
}

impl<'a> IntoIterator for &'a InstructionSequence {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_at(ns: u64) -> Instruction {
        Instruction::new(Instant::nanos(ns), Payload::constant(1.0), None)
    }

    // =========================================================================
    // Payload
    // =========================================================================

    #[test]
    fn test_payload_needs_clock() {
        assert!(Payload::constant(0).needs_clock());
        assert!(Payload::ramp("sin", 4).needs_clock());
        assert!(!Payload::static_value(0).needs_clock());
    }

    #[test]
    fn test_payload_yaml_tagged() {
        let p: Payload = serde_yaml::from_str("{kind: ramp, function: sin, samples: 20}").unwrap();
        assert_eq!(p, Payload::ramp("sin", 20));
        let p: Payload = serde_yaml::from_str("{kind: constant, value: 3.3}").unwrap();
        assert_eq!(p, Payload::constant(3.3));
    }

    // =========================================================================
    // Instruction edges
    // =========================================================================

    #[test]
    fn test_constant_has_single_edge() {
        let edges = constant_at(100).edge_instants().unwrap();
        assert_eq!(edges, vec![Instant::nanos(100)]);
    }

    #[test]
    fn test_static_has_no_edges() {
        let i = Instruction::new(Instant::zero(), Payload::static_value(5), None);
        assert!(i.edge_instants().unwrap().is_empty());
    }

    #[test]
    fn test_ramp_edges_equally_spaced() {
        let i = Instruction::new(
            Instant::micros(1),
            Payload::ramp("sin", 4),
            Some(Instant::micros(2)),
        );
        let edges = i.edge_instants().unwrap();
        assert_eq!(
            edges,
            vec![
                Instant::nanos(1_000),
                Instant::nanos(1_500),
                Instant::nanos(2_000),
                Instant::nanos(2_500),
            ]
        );
        assert_eq!(i.end_time(), Instant::micros(3));
    }

    #[test]
    fn test_ramp_zero_samples_fails() {
        let i = Instruction::new(Instant::zero(), Payload::ramp("sin", 0), Some(Instant::micros(1)));
        assert!(matches!(
            i.edge_instants(),
            Err(ScheduleError::NonIntegerDivision { .. })
        ));
    }

    #[test]
    fn test_end_time_without_duration() {
        assert_eq!(constant_at(40).end_time(), Instant::nanos(40));
    }

    // =========================================================================
    // Sequence ordering
    // =========================================================================

    #[test]
    fn test_insert_keeps_order() {
        let mut seq = InstructionSequence::new();
        seq.insert(constant_at(30)).unwrap();
        seq.insert(constant_at(10)).unwrap();
        assert_eq!(seq.insert(constant_at(20)).unwrap(), 1);
        let times: Vec<_> = seq.iter().map(|i| i.time.clone()).collect();
        assert_eq!(
            times,
            vec![Instant::nanos(10), Instant::nanos(20), Instant::nanos(30)]
        );
    }

    #[test]
    fn test_insert_duplicate_time() {
        let mut seq = InstructionSequence::new();
        seq.insert(constant_at(10)).unwrap();
        let rejected = seq.insert(constant_at(10)).unwrap_err();
        assert_eq!(rejected.time, Instant::nanos(10));
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn test_edge_count() {
        let mut seq = InstructionSequence::new();
        seq.insert(Instruction::new(Instant::zero(), Payload::static_value(1), None))
            .unwrap();
        seq.insert(constant_at(10)).unwrap();
        seq.insert(Instruction::new(
            Instant::micros(1),
            Payload::ramp("lin", 8),
            Some(Instant::micros(1)),
        ))
        .unwrap();
        assert_eq!(seq.edge_count(), 9);
    }

    #[test]
    fn test_edge_count_saturates() {
        let mut seq = InstructionSequence::new();
        for t in [1, 2] {
            seq.insert(Instruction::new(
                Instant::micros(t),
                Payload::ramp("lin", u64::MAX),
                Some(Instant::nanos(1)),
            ))
            .unwrap();
        }
        assert_eq!(seq.edge_count(), u64::MAX);
    }
}
