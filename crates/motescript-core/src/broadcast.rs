//! Applying one parameter set to every node.
//!
//! Broadcasts are best-effort: a node that lacks a variable is logged by the
//! accessor and skipped, the remaining nodes are still configured. No
//! aggregate result is returned; plans detect misconfiguration through the
//! message stream.

use std::fmt;

use crate::memory::{Node, VarAccessor, VarValue};

/// One symbolic-variable write, applied to each node of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    /// Firmware variable name.
    pub name: String,
    /// Value to store.
    pub value: VarValue,
}

impl ParameterBinding {
    /// Binding for a 16-bit variable.
    pub fn int16(name: impl Into<String>, value: u16) -> Self {
        Self { name: name.into(), value: VarValue::Int16(value) }
    }
}

impl fmt::Display for ParameterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Apply `binding` to every node, in enumeration order.
///
/// Returns only after every node has been visited.
pub fn broadcast<N: Node>(nodes: &mut [N], binding: &ParameterBinding, accessor: &VarAccessor) {
    let mut failed = 0usize;
    for node in nodes.iter_mut() {
        if !accessor.write(node, &binding.name, binding.value) {
            failed += 1;
        }
    }

    tracing::debug!(binding = %binding, nodes = nodes.len(), failed, "broadcast complete");
}

/// Broadcast each binding in turn.
pub fn broadcast_all<N: Node>(
    nodes: &mut [N],
    bindings: &[ParameterBinding],
    accessor: &VarAccessor,
) {
    for binding in bindings {
        broadcast(nodes, binding, accessor);
    }
}
