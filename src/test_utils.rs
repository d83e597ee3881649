// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared test utilities for building device trees.

use crate::temporal::{Constraints, DeviceRole, DeviceTree, Instant, NodeId, RootClockParams};

pub fn us(count: u64) -> Instant {
    Instant::micros(count)
}

pub fn ns(count: u64) -> Instant {
    Instant::nanos(count)
}

/// A tree holding only an unconstrained root clock with a 1 ns timebase.
pub fn root_tree() -> (DeviceTree, NodeId) {
    let mut tree = DeviceTree::new();
    let root = tree
        .add_root_clock("root", Constraints::default(), RootClockParams::new(ns(1)))
        .expect("root clock");
    (tree, root)
}

pub fn add_clock(
    tree: &mut DeviceTree,
    parent: NodeId,
    name: &str,
    min_period: Instant,
    trigger_delay: Instant,
) -> NodeId {
    tree.add_node(
        parent,
        name,
        DeviceRole::Clock,
        Constraints::new(min_period),
        trigger_delay,
    )
    .expect("clock node")
}

pub fn add_terminal(
    tree: &mut DeviceTree,
    parent: NodeId,
    name: &str,
    min_period: Instant,
    trigger_delay: Instant,
) -> NodeId {
    tree.add_node(
        parent,
        name,
        DeviceRole::Terminal,
        Constraints::new(min_period),
        trigger_delay,
    )
    .expect("terminal node")
}

/// Minimal experiment description in YAML: root → ao with one instruction.
pub const SIMPLE_EXPERIMENT_YAML: &str = r#"
devices:
  - name: pulseblaster
    role: root_clock
    granularity: 10ns
    constraints:
      min_period: 1us
  - name: ao0
    parent: pulseblaster
    role: terminal
    trigger_delay: 500ns
instructions:
  - device: ao0
    time: 10us
    payload:
      kind: constant
      value: 1.5
"#;
