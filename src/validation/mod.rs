// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Input validation for experiment descriptions.
//!
//! These checks run before a tree is built. They catch malformed or
//! oversized descriptions that would otherwise surface as a less helpful
//! structural error halfway through construction.

use std::collections::HashSet;

use crate::config::ResourceLimits;
use crate::error::{Result, ValidationError};
use crate::experiment::ExperimentDescription;
use crate::temporal::{DeviceRole, Payload};

/// Validate an experiment description against resource limits.
pub fn validate_description(
    description: &ExperimentDescription,
    limits: &ResourceLimits,
) -> Result<()> {
    let device_count = description.devices.len() as u64;
    if device_count == 0 {
        return Err(ValidationError::Field {
            field: "devices".into(),
            message: "at least a root clock is required".into(),
        }
        .into());
    }
    if device_count > limits.max_devices as u64 {
        return Err(ValidationError::ResourceLimit {
            resource: "devices".into(),
            limit: limits.max_devices as u64,
            requested: device_count,
        }
        .into());
    }

    let wait_count = description.waits.len() as u64;
    if wait_count > limits.max_waits as u64 {
        return Err(ValidationError::ResourceLimit {
            resource: "waits".into(),
            limit: limits.max_waits as u64,
            requested: wait_count,
        }
        .into());
    }

    validate_devices(description)?;
    validate_instructions(description, limits)?;

    for (i, wait) in description.waits.iter().enumerate() {
        if wait.name.trim().is_empty() {
            return Err(ValidationError::Field {
                field: format!("waits[{}].name", i),
                message: "must not be empty".into(),
            }
            .into());
        }
    }

    Ok(())
}

/// Names are unique and non-empty, exactly one root clock exists, and
/// every parent is declared before its children.
fn validate_devices(description: &ExperimentDescription) -> Result<()> {
    let mut declared: HashSet<&str> = HashSet::new();
    let mut roots = 0;

    for (i, device) in description.devices.iter().enumerate() {
        if device.name.trim().is_empty() {
            return Err(ValidationError::Field {
                field: format!("devices[{}].name", i),
                message: "must not be empty".into(),
            }
            .into());
        }
        if !declared.insert(device.name.as_str()) {
            return Err(ValidationError::Field {
                field: format!("devices[{}].name", i),
                message: format!("duplicate device name '{}'", device.name),
            }
            .into());
        }

        match (device.role, device.parent.as_deref()) {
            (DeviceRole::RootClock, None) => {
                roots += 1;
                if device.granularity.is_none() {
                    return Err(ValidationError::Field {
                        field: format!("devices[{}].granularity", i),
                        message: "the root clock needs a granularity".into(),
                    }
                    .into());
                }
            }
            (DeviceRole::RootClock, Some(_)) => {
                return Err(ValidationError::Field {
                    field: format!("devices[{}].parent", i),
                    message: "the root clock has no parent".into(),
                }
                .into());
            }
            (_, None) => {
                return Err(ValidationError::Field {
                    field: format!("devices[{}].parent", i),
                    message: format!("'{}' needs a parent clock", device.name),
                }
                .into());
            }
            (_, Some(parent)) => {
                if parent == device.name || !declared.contains(parent) {
                    return Err(ValidationError::Field {
                        field: format!("devices[{}].parent", i),
                        message: format!("parent '{}' must be declared earlier", parent),
                    }
                    .into());
                }
            }
        }
    }

    if roots != 1 {
        return Err(ValidationError::Field {
            field: "devices".into(),
            message: format!("expected exactly one root clock, found {}", roots),
        }
        .into());
    }
    Ok(())
}

/// Instructions target declared devices and stay within the per-device
/// instruction and edge caps.
fn validate_instructions(description: &ExperimentDescription, limits: &ResourceLimits) -> Result<()> {
    let mut per_device: Vec<u64> = vec![0; description.devices.len()];
    let mut edges: Vec<u64> = vec![0; description.devices.len()];

    for (i, instruction) in description.instructions.iter().enumerate() {
        let Some(index) = description
            .devices
            .iter()
            .position(|d| d.name == instruction.device)
        else {
            return Err(ValidationError::Field {
                field: format!("instructions[{}].device", i),
                message: format!("unknown device '{}'", instruction.device),
            }
            .into());
        };

        per_device[index] += 1;
        if per_device[index] > limits.max_instructions_per_device as u64 {
            return Err(ValidationError::ResourceLimit {
                resource: format!("instructions on '{}'", instruction.device),
                limit: limits.max_instructions_per_device as u64,
                requested: per_device[index],
            }
            .into());
        }

        let needed = match &instruction.payload {
            Payload::Static { .. } => 0,
            Payload::Constant { .. } => 1,
            Payload::Ramp { samples, .. } => *samples,
        };
        edges[index] = edges[index].saturating_add(needed);
        if edges[index] > limits.max_edges_per_device {
            return Err(ValidationError::ResourceLimit {
                resource: format!("clock edges on '{}'", instruction.device),
                limit: limits.max_edges_per_device,
                requested: edges[index],
            }
            .into());
        }
    }
    Ok(())
}
