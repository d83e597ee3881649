// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Experiment descriptions: the serialized input contract.
//!
//! An [`ExperimentDescription`] lists devices (parents before children),
//! timed instructions and waits. It is read from YAML or JSON and turned
//! into a [`DeviceTree`] with [`ExperimentDescription::build_tree`].
//!
//! ```yaml
//! devices:
//!   - name: pulseblaster
//!     role: root_clock
//!     granularity: 10ns
//!     constraints: { min_period: 1us }
//!   - name: ao0
//!     parent: pulseblaster
//!     role: terminal
//!     trigger_delay: 500ns
//! instructions:
//!   - { device: ao0, time: 10us, payload: { kind: constant, value: 1.5 } }
//! waits:
//!   - { name: reload, time: 1ms }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result, ValidationError};
use crate::temporal::{Constraints, DeviceRole, DeviceTree, Instant, Payload, RootClockParams};

/// A device entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    /// Name of the driving clock; absent only for the root clock.
    #[serde(default)]
    pub parent: Option<String>,
    pub role: DeviceRole,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub trigger_delay: Instant,
    /// Root clock timebase.
    #[serde(default)]
    pub granularity: Option<Instant>,
    /// Root clock dead time after a wait.
    #[serde(default)]
    pub wait_delay: Option<Instant>,
}

/// A timed instruction entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionSpec {
    pub device: String,
    pub time: Instant,
    pub payload: Payload,
    #[serde(default)]
    pub duration: Option<Instant>,
}

/// A wait entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitSpec {
    pub name: String,
    pub time: Instant,
}

/// Full description of one experiment shot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentDescription {
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub instructions: Vec<InstructionSpec>,
    #[serde(default)]
    pub waits: Vec<WaitSpec>,
}

impl ExperimentDescription {
    /// Read a description file; `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(&content)?)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Build the device tree, then add instructions and waits.
    ///
    /// # Errors
    ///
    /// - `Validation` for a root clock without granularity, or a reference
    ///   to an undeclared device
    /// - `Schedule` for any structural error raised by the tree
    pub fn build_tree(&self) -> Result<DeviceTree> {
        let mut tree = DeviceTree::new();

        for (i, device) in self.devices.iter().enumerate() {
            match (&device.role, &device.parent) {
                (DeviceRole::RootClock, _) => {
                    let granularity = device.granularity.clone().ok_or_else(|| {
                        Error::Validation(ValidationError::Field {
                            field: format!("devices[{}].granularity", i),
                            message: "the root clock needs a granularity".into(),
                        })
                    })?;
                    let params = RootClockParams::new(granularity)
                        .with_wait_delay(device.wait_delay.clone().unwrap_or_default());
                    tree.add_root_clock(device.name.clone(), device.constraints.clone(), params)?;
                }
                (role, parent) => {
                    let parent_id = parent
                        .as_deref()
                        .and_then(|p| tree.find(p))
                        .ok_or_else(|| {
                            Error::Validation(ValidationError::Field {
                                field: format!("devices[{}].parent", i),
                                message: format!(
                                    "'{}' needs a parent declared before it",
                                    device.name
                                ),
                            })
                        })?;
                    tree.add_node(
                        parent_id,
                        device.name.clone(),
                        *role,
                        device.constraints.clone(),
                        device.trigger_delay.clone(),
                    )?;
                }
            }
        }

        for (i, instruction) in self.instructions.iter().enumerate() {
            let device = tree.find(&instruction.device).ok_or_else(|| {
                Error::Validation(ValidationError::Field {
                    field: format!("instructions[{}].device", i),
                    message: format!("unknown device '{}'", instruction.device),
                })
            })?;
            tree.add_instruction(
                device,
                instruction.time.clone(),
                instruction.payload.clone(),
                instruction.duration.clone(),
            )?;
        }

        for wait in &self.waits {
            tree.add_wait(wait.name.clone(), wait.time.clone())?;
        }

        info!(
            devices = tree.len(),
            instructions = self.instructions.len(),
            waits = self.waits.len(),
            "Device tree built"
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScheduleError;
    use crate::temporal::resolve;
    use crate::test_utils::{ns, us, SIMPLE_EXPERIMENT_YAML};
    use std::io::Write as _;

    #[test]
    fn test_parse_simple_yaml() {
        let desc = ExperimentDescription::from_yaml_str(SIMPLE_EXPERIMENT_YAML).unwrap();
        assert_eq!(desc.devices.len(), 2);
        assert_eq!(desc.devices[0].role, DeviceRole::RootClock);
        assert_eq!(desc.devices[0].granularity, Some(ns(10)));
        assert_eq!(desc.devices[1].trigger_delay, ns(500));
        assert_eq!(desc.instructions[0].payload, Payload::constant(1.5));
        assert!(desc.waits.is_empty());
    }

    #[test]
    fn test_build_and_resolve() {
        let desc = ExperimentDescription::from_yaml_str(SIMPLE_EXPERIMENT_YAML).unwrap();
        let tree = desc.build_tree().unwrap();
        let root = tree.find("pulseblaster").unwrap();
        let ao = tree.find("ao0").unwrap();

        let schedule = resolve(&tree).unwrap();
        assert_eq!(schedule.ticks(root).unwrap(), &[ns(9_500)]);
        assert_eq!(schedule.outputs(ao).unwrap()[0].time, us(10));
    }

    #[test]
    fn test_load_json_file() {
        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            f,
            r#"{{
                "devices": [
                    {{"name": "root", "role": "root_clock", "granularity": "1ns", "wait_delay": "100ns"}},
                    {{"name": "do0", "parent": "root", "role": "terminal"}}
                ],
                "instructions": [
                    {{"device": "do0", "time": "2us", "payload": {{"kind": "ramp", "function": "lin", "samples": 4}}, "duration": "1us"}}
                ],
                "waits": [{{"name": "reload", "time": "10us"}}]
            }}"#
        )
        .unwrap();

        let desc = ExperimentDescription::load(f.path()).unwrap();
        let tree = desc.build_tree().unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.waits()[0].name, "reload");
        assert_eq!(tree.root_params().unwrap().wait_delay, ns(100));
    }

    #[test]
    fn test_load_yaml_file() {
        let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        f.write_all(SIMPLE_EXPERIMENT_YAML.as_bytes()).unwrap();
        let desc = ExperimentDescription::load(f.path()).unwrap();
        assert_eq!(desc.instructions.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ExperimentDescription::load(Path::new("/tmp/does_not_exist_clocktree.yaml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let result = ExperimentDescription::from_yaml_str("devices: [{{{");
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_bad_instant_in_yaml() {
        let yaml = SIMPLE_EXPERIMENT_YAML.replace("time: 10us", "time: 10 fortnights");
        let result = ExperimentDescription::from_yaml_str(&yaml);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_huge_ramp_fails_cleanly() {
        let yaml = r#"
devices:
  - { name: root, role: root_clock, granularity: 10ns }
  - { name: ao0, parent: root, role: terminal, constraints: { max_instructions: 16 } }
instructions:
  - device: ao0
    time: 1us
    duration: 1us
    payload: { kind: ramp, function: lin, samples: 18446744073709551615 }
"#;
        let desc = ExperimentDescription::from_yaml_str(yaml).unwrap();
        let tree = desc.build_tree().unwrap();
        let ao = tree.find("ao0").unwrap();
        assert_eq!(
            resolve(&tree).unwrap_err(),
            ScheduleError::MaxInstructionsExceeded {
                device: tree.device_ref(ao).unwrap(),
                limit: 16,
                count: u64::MAX,
            }
        );
    }

    #[test]
    fn test_huge_exponent_in_time_rejected() {
        let yaml = SIMPLE_EXPERIMENT_YAML.replace("time: 10us", "time: \"1e-99999999\"");
        let result = ExperimentDescription::from_yaml_str(&yaml);
        match result {
            Err(Error::Serialization(msg)) => assert!(msg.contains("exponent out of range")),
            other => panic!("expected serialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_build_tree_missing_granularity() {
        let mut desc = ExperimentDescription::from_yaml_str(SIMPLE_EXPERIMENT_YAML).unwrap();
        desc.devices[0].granularity = None;
        assert!(matches!(
            desc.build_tree(),
            Err(Error::Validation(ValidationError::Field { .. }))
        ));
    }

    #[test]
    fn test_build_tree_unknown_parent() {
        let mut desc = ExperimentDescription::from_yaml_str(SIMPLE_EXPERIMENT_YAML).unwrap();
        desc.devices[1].parent = Some("nowhere".into());
        assert!(matches!(desc.build_tree(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_build_tree_structural_error() {
        let mut desc = ExperimentDescription::from_yaml_str(SIMPLE_EXPERIMENT_YAML).unwrap();
        let duplicate = desc.instructions[0].clone();
        desc.instructions.push(duplicate);
        assert!(matches!(
            desc.build_tree(),
            Err(Error::Schedule(ScheduleError::DuplicateTime { .. }))
        ));
    }
}
