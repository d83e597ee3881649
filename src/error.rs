// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for tree construction, resolution and validation.

use std::fmt;

use crate::temporal::{DeviceRef, DeviceRole, Instant, ParseInstantError};

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug)]
pub enum Error {
    /// Configuration error
    Config(String),
    /// Tree construction or resolution failure
    Schedule(ScheduleError),
    /// Experiment description validation error
    Validation(ValidationError),
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Schedule(e) => write!(f, "Schedule error: {}", e),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Schedule(e) => Some(e),
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ScheduleError> for Error {
    fn from(e: ScheduleError) -> Self {
        Error::Schedule(e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}

impl From<ParseInstantError> for Error {
    fn from(e: ParseInstantError) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Broad class of a [`ScheduleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raised immediately by a tree mutation.
    Structural,
    /// Raised during resolution or validation.
    Temporal,
    /// Raised by exact time arithmetic.
    Arithmetic,
}

/// Discriminant of a [`ScheduleError`], convenient for matching in callers
/// that do not care about the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownParent,
    UnknownDevice,
    InvalidRole,
    DuplicateTime,
    DuplicateName,
    NegativeTime,
    InvalidInstruction,
    MinPeriodViolated,
    TriggerWidthViolated,
    UnalignedInstruction,
    NonRepresentableInstant,
    SettlingTimeViolated,
    MaxInstructionsExceeded,
    NonMonotonic,
    WaitDelayViolated,
    NonIntegerDivision,
}

impl ErrorKind {
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::UnknownParent
            | ErrorKind::UnknownDevice
            | ErrorKind::InvalidRole
            | ErrorKind::DuplicateTime
            | ErrorKind::DuplicateName
            | ErrorKind::NegativeTime
            | ErrorKind::InvalidInstruction => ErrorCategory::Structural,
            ErrorKind::NonIntegerDivision => ErrorCategory::Arithmetic,
            _ => ErrorCategory::Temporal,
        }
    }
}

/// A single structured scheduling failure.
///
/// Every variant names the offending device(s) and instant(s) so that the
/// caller can adjust its instructions and retry.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleError {
    /// `add_node` referenced a parent id that is not in the tree.
    UnknownParent { parent: crate::temporal::NodeId },
    /// An operation referenced a device id that is not in the tree.
    UnknownDevice { device: crate::temporal::NodeId },
    /// Role not permitted at this position of the hierarchy.
    InvalidRole {
        device: String,
        role: DeviceRole,
        reason: &'static str,
    },
    /// Another instruction (or wait) already occupies this exact instant.
    DuplicateTime { device: DeviceRef, instant: Instant },
    /// A device or wait name is already taken.
    DuplicateName { name: String },
    /// A time value supplied to the tree is below zero.
    NegativeTime {
        device: String,
        field: &'static str,
        instant: Instant,
    },
    /// The payload is incompatible with the instruction's shape.
    InvalidInstruction {
        device: DeviceRef,
        instant: Instant,
        reason: &'static str,
    },
    /// Two distinct edges on one clock are closer than its minimum period.
    ///
    /// `device` lost the slot to `conflicting_device`, which was declared
    /// earlier (or required the earlier edge).
    MinPeriodViolated {
        clock: DeviceRef,
        device: DeviceRef,
        instant: Instant,
        conflicting_device: DeviceRef,
        conflicting_instant: Instant,
        min_period: Instant,
    },
    /// Two edges on one clock leave no room for a high and a low pulse of
    /// the trigger width its driven devices need.
    TriggerWidthViolated {
        clock: DeviceRef,
        device: DeviceRef,
        instant: Instant,
        conflicting_device: DeviceRef,
        conflicting_instant: Instant,
        min_trigger: Instant,
    },
    /// No tick of the driving clock sits exactly at the required instant.
    UnalignedInstruction {
        device: DeviceRef,
        instant: Instant,
        required_tick: Instant,
    },
    /// A tick is not an integer multiple of the root clock granularity.
    NonRepresentableInstant {
        device: DeviceRef,
        instant: Instant,
        granularity: Instant,
    },
    /// An instruction starts before the previous one has finished settling.
    SettlingTimeViolated {
        device: DeviceRef,
        instant: Instant,
        previous: Instant,
        available_at: Instant,
    },
    /// More ticks or outputs than the device can hold.
    MaxInstructionsExceeded {
        device: DeviceRef,
        limit: u64,
        count: u64,
    },
    /// Instants of a device are not strictly increasing.
    NonMonotonic {
        device: DeviceRef,
        instant: Instant,
        previous: Instant,
    },
    /// The root clock was asked to tick before it can respond after a wait.
    WaitDelayViolated {
        clock: DeviceRef,
        wait: String,
        wait_instant: Instant,
        instant: Instant,
        resume_at: Instant,
    },
    /// An exact division produced a non-integer (or undefined) quotient.
    NonIntegerDivision { dividend: Instant, divisor: String },
}

impl ScheduleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScheduleError::UnknownParent { .. } => ErrorKind::UnknownParent,
            ScheduleError::UnknownDevice { .. } => ErrorKind::UnknownDevice,
            ScheduleError::InvalidRole { .. } => ErrorKind::InvalidRole,
            ScheduleError::DuplicateTime { .. } => ErrorKind::DuplicateTime,
            ScheduleError::DuplicateName { .. } => ErrorKind::DuplicateName,
            ScheduleError::NegativeTime { .. } => ErrorKind::NegativeTime,
            ScheduleError::InvalidInstruction { .. } => ErrorKind::InvalidInstruction,
            ScheduleError::MinPeriodViolated { .. } => ErrorKind::MinPeriodViolated,
            ScheduleError::TriggerWidthViolated { .. } => ErrorKind::TriggerWidthViolated,
            ScheduleError::UnalignedInstruction { .. } => ErrorKind::UnalignedInstruction,
            ScheduleError::NonRepresentableInstant { .. } => ErrorKind::NonRepresentableInstant,
            ScheduleError::SettlingTimeViolated { .. } => ErrorKind::SettlingTimeViolated,
            ScheduleError::MaxInstructionsExceeded { .. } => ErrorKind::MaxInstructionsExceeded,
            ScheduleError::NonMonotonic { .. } => ErrorKind::NonMonotonic,
            ScheduleError::WaitDelayViolated { .. } => ErrorKind::WaitDelayViolated,
            ScheduleError::NonIntegerDivision { .. } => ErrorKind::NonIntegerDivision,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind().category()
    }

    /// Devices named by this error, offender first.
    pub fn devices(&self) -> Vec<&DeviceRef> {
        match self {
            ScheduleError::DuplicateTime { device, .. }
            | ScheduleError::InvalidInstruction { device, .. }
            | ScheduleError::UnalignedInstruction { device, .. }
            | ScheduleError::NonRepresentableInstant { device, .. }
            | ScheduleError::SettlingTimeViolated { device, .. }
            | ScheduleError::MaxInstructionsExceeded { device, .. }
            | ScheduleError::NonMonotonic { device, .. } => vec![device],
            ScheduleError::MinPeriodViolated {
                clock,
                device,
                conflicting_device,
                ..
            }
            | ScheduleError::TriggerWidthViolated {
                clock,
                device,
                conflicting_device,
                ..
            } => {
                let mut devices = vec![device];
                if conflicting_device != device {
                    devices.push(conflicting_device);
                }
                if clock != device && clock != conflicting_device {
                    devices.push(clock);
                }
                devices
            }
            ScheduleError::WaitDelayViolated { clock, .. } => vec![clock],
            ScheduleError::UnknownParent { .. }
            | ScheduleError::UnknownDevice { .. }
            | ScheduleError::InvalidRole { .. }
            | ScheduleError::DuplicateName { .. }
            | ScheduleError::NegativeTime { .. }
            | ScheduleError::NonIntegerDivision { .. } => Vec::new(),
        }
    }

    /// Instants named by this error, offending instant first.
    pub fn instants(&self) -> Vec<&Instant> {
        match self {
            ScheduleError::DuplicateTime { instant, .. }
            | ScheduleError::NegativeTime { instant, .. }
            | ScheduleError::InvalidInstruction { instant, .. }
            | ScheduleError::NonRepresentableInstant { instant, .. } => vec![instant],
            ScheduleError::UnalignedInstruction {
                instant,
                required_tick,
                ..
            } => vec![instant, required_tick],
            ScheduleError::MinPeriodViolated {
                instant,
                conflicting_instant,
                ..
            }
            | ScheduleError::TriggerWidthViolated {
                instant,
                conflicting_instant,
                ..
            } => vec![instant, conflicting_instant],
            ScheduleError::SettlingTimeViolated {
                instant, previous, ..
            }
            | ScheduleError::NonMonotonic {
                instant, previous, ..
            } => vec![instant, previous],
            ScheduleError::WaitDelayViolated {
                instant,
                wait_instant,
                ..
            } => vec![instant, wait_instant],
            ScheduleError::NonIntegerDivision { dividend, .. } => vec![dividend],
            ScheduleError::UnknownParent { .. }
            | ScheduleError::UnknownDevice { .. }
            | ScheduleError::InvalidRole { .. }
            | ScheduleError::DuplicateName { .. }
            | ScheduleError::MaxInstructionsExceeded { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::UnknownParent { parent } => {
                write!(f, "Unknown parent device {}", parent)
            }
            ScheduleError::UnknownDevice { device } => write!(f, "Unknown device {}", device),
            ScheduleError::InvalidRole {
                device,
                role,
                reason,
            } => write!(f, "Invalid role {} for '{}': {}", role, device, reason),
            ScheduleError::DuplicateTime { device, instant } => {
                write!(f, "{} already has an instruction at {}", device, instant)
            }
            ScheduleError::DuplicateName { name } => write!(f, "Name '{}' is already in use", name),
            ScheduleError::NegativeTime {
                device,
                field,
                instant,
            } => write!(f, "Negative {} {} for '{}'", field, instant, device),
            ScheduleError::InvalidInstruction {
                device,
                instant,
                reason,
            } => write!(f, "Invalid instruction on {} at {}: {}", device, instant, reason),
            ScheduleError::MinPeriodViolated {
                clock,
                device,
                instant,
                conflicting_device,
                conflicting_instant,
                min_period,
            } => write!(
                f,
                "Minimum period {} of {} violated: edge at {} for {} is too close to edge at {} for {}",
                min_period, clock, instant, device, conflicting_instant, conflicting_device
            ),
            ScheduleError::TriggerWidthViolated {
                clock,
                device,
                instant,
                conflicting_device,
                conflicting_instant,
                min_trigger,
            } => write!(
                f,
                "Edges of {} at {} for {} and {} for {} cannot hold trigger pulses of {}",
                clock, conflicting_instant, conflicting_device, instant, device, min_trigger
            ),
            ScheduleError::UnalignedInstruction {
                device,
                instant,
                required_tick,
            } => write!(
                f,
                "Instruction of {} at {} has no driving clock tick at {}",
                device, instant, required_tick
            ),
            ScheduleError::NonRepresentableInstant {
                device,
                instant,
                granularity,
            } => write!(
                f,
                "Tick at {} required by {} is not a multiple of the clock granularity {}",
                instant, device, granularity
            ),
            ScheduleError::SettlingTimeViolated {
                device,
                instant,
                previous,
                available_at,
            } => write!(
                f,
                "{} instruction at {} starts before the instruction at {} has settled (available at {})",
                device, instant, previous, available_at
            ),
            ScheduleError::MaxInstructionsExceeded {
                device,
                limit,
                count,
            } => write!(
                f,
                "{} holds at most {} instructions, schedule needs {}",
                device, limit, count
            ),
            ScheduleError::NonMonotonic {
                device,
                instant,
                previous,
            } => write!(
                f,
                "{} instants are not strictly increasing: {} follows {}",
                device, instant, previous
            ),
            ScheduleError::WaitDelayViolated {
                clock,
                wait,
                wait_instant,
                instant,
                resume_at,
            } => write!(
                f,
                "{} ticks at {} during wait '{}' at {} (earliest resume {})",
                clock, instant, wait, wait_instant, resume_at
            ),
            ScheduleError::NonIntegerDivision { dividend, divisor } => {
                write!(f, "{} is not exactly divisible by {}", dividend, divisor)
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Experiment description validation errors.
#[derive(Debug)]
pub enum ValidationError {
    /// Field validation failed
    Field { field: String, message: String },
    /// Resource limit exceeded
    ResourceLimit {
        resource: String,
        limit: u64,
        requested: u64,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Field { field, message } => {
                write!(f, "Field '{}': {}", field, message)
            }
            ValidationError::ResourceLimit {
                resource,
                limit,
                requested,
            } => {
                write!(
                    f,
                    "Resource limit exceeded for {}: limit={}, requested={}",
                    resource, limit, requested
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal::NodeId;
    use std::error::Error as StdError;

    fn dev(id: u32, name: &str) -> DeviceRef {
        DeviceRef::new(NodeId(id), name)
    }

    // =========================================================================
    // Error Display tests
    // =========================================================================

    #[test]
    fn test_error_display_config() {
        let e = Error::Config("bad level".into());
        assert_eq!(e.to_string(), "Configuration error: bad level");
    }

    #[test]
    fn test_error_display_schedule() {
        let e = Error::Schedule(ScheduleError::UnknownParent { parent: NodeId(7) });
        assert_eq!(e.to_string(), "Schedule error: Unknown parent device #7");
    }

    #[test]
    fn test_error_display_io() {
        let e = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(e.to_string(), "IO error: gone");
    }

    #[test]
    fn test_error_display_serialization() {
        let e = Error::Serialization("invalid yaml".into());
        assert_eq!(e.to_string(), "Serialization error: invalid yaml");
    }

    // =========================================================================
    // ScheduleError Display tests
    // =========================================================================

    #[test]
    fn test_schedule_error_display_min_period() {
        let e = ScheduleError::MinPeriodViolated {
            clock: dev(1, "clock"),
            device: dev(3, "ao1"),
            instant: Instant::nanos(5_000),
            conflicting_device: dev(2, "ao0"),
            conflicting_instant: Instant::nanos(4_000),
            min_period: Instant::micros(2),
        };
        let msg = e.to_string();
        assert!(msg.contains("'clock' (#1)"));
        assert!(msg.contains("'ao1' (#3)"));
        assert!(msg.contains("'ao0' (#2)"));
        assert!(msg.contains("0.000005s"));
    }

    #[test]
    fn test_schedule_error_display_non_integer_division() {
        let e = ScheduleError::NonIntegerDivision {
            dividend: Instant::nanos(10),
            divisor: "0".into(),
        };
        assert_eq!(e.to_string(), "0.00000001s is not exactly divisible by 0");
    }

    #[test]
    fn test_validation_error_display_resource_limit() {
        let e = ValidationError::ResourceLimit {
            resource: "devices".into(),
            limit: 10,
            requested: 20,
        };
        assert_eq!(
            e.to_string(),
            "Resource limit exceeded for devices: limit=10, requested=20"
        );
    }

    // =========================================================================
    // Structured accessors
    // =========================================================================

    #[test]
    fn test_kind_and_category() {
        let e = ScheduleError::DuplicateName { name: "x".into() };
        assert_eq!(e.kind(), ErrorKind::DuplicateName);
        assert_eq!(e.category(), ErrorCategory::Structural);

        let e = ScheduleError::NonIntegerDivision {
            dividend: Instant::zero(),
            divisor: "0".into(),
        };
        assert_eq!(e.category(), ErrorCategory::Arithmetic);

        let e = ScheduleError::MaxInstructionsExceeded {
            device: dev(0, "root"),
            limit: 1,
            count: 2,
        };
        assert_eq!(e.category(), ErrorCategory::Temporal);
    }

    #[test]
    fn test_min_period_devices_names_both() {
        let e = ScheduleError::MinPeriodViolated {
            clock: dev(1, "clock"),
            device: dev(3, "b"),
            instant: Instant::micros(5),
            conflicting_device: dev(2, "a"),
            conflicting_instant: Instant::micros(5),
            min_period: Instant::micros(1),
        };
        let ids: Vec<NodeId> = e.devices().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![NodeId(3), NodeId(2), NodeId(1)]);
        assert_eq!(e.instants().len(), 2);
    }

    #[test]
    fn test_trigger_width_accessors() {
        let e = ScheduleError::TriggerWidthViolated {
            clock: dev(0, "root"),
            device: dev(2, "b"),
            instant: Instant::nanos(150),
            conflicting_device: dev(1, "a"),
            conflicting_instant: Instant::nanos(100),
            min_trigger: Instant::nanos(30),
        };
        assert_eq!(e.kind(), ErrorKind::TriggerWidthViolated);
        assert_eq!(e.category(), ErrorCategory::Temporal);
        let ids: Vec<NodeId> = e.devices().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![NodeId(2), NodeId(1), NodeId(0)]);
        assert_eq!(e.instants(), vec![&Instant::nanos(150), &Instant::nanos(100)]);
        assert!(e.to_string().contains("0.00000003s"));
    }

    #[test]
    fn test_min_period_devices_same_device_once() {
        let e = ScheduleError::MinPeriodViolated {
            clock: dev(0, "root"),
            device: dev(0, "root"),
            instant: Instant::micros(2),
            conflicting_device: dev(0, "root"),
            conflicting_instant: Instant::micros(1),
            min_period: Instant::micros(5),
        };
        assert_eq!(e.devices().len(), 1);
    }

    // =========================================================================
    // Error::source() and From impls
    // =========================================================================

    #[test]
    fn test_error_source_schedule() {
        let e = Error::Schedule(ScheduleError::DuplicateName { name: "x".into() });
        assert!(e.source().is_some());
    }

    #[test]
    fn test_error_source_none_for_config() {
        let e = Error::Config("x".into());
        assert!(e.source().is_none());
    }

    #[test]
    fn test_from_schedule_error() {
        let e: Error = ScheduleError::UnknownDevice { device: NodeId(1) }.into();
        assert!(matches!(e, Error::Schedule(ScheduleError::UnknownDevice { .. })));
    }

    #[test]
    fn test_from_serde_yaml_error() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("{{{{").unwrap_err();
        let e: Error = yaml_err.into();
        assert!(matches!(e, Error::Serialization(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let e: Error = json_err.into();
        assert!(matches!(e, Error::Serialization(_)));
    }
}
