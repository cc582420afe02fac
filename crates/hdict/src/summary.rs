//! Text summary of a container's content.
//!
//! ```text
//! Container (a) (not saved):
//! {
//!     "gain": "2.500 (type: f64)",
//!     "trace" (r): "shape: (2, 3) (dtype: f64)",
//!     "settings": {
//!         "name": "variable of type str"
//!     }
//! }
//! Unloaded keys: {"raw"}
//! ```

use crate::container::ContainerInner;
use crate::entry::{EntryTable, Slot};
use crate::lock::KeyLock;
use hdict_core::types::{key, Value};

/// Groups deeper than this are described, not expanded.
const MAX_DEPTH: usize = 3;
/// Groups with more children than this are described, not expanded.
const MAX_CHILDREN: usize = 5;
const INDENT: usize = 4;

enum Node {
    Leaf(String),
    Group(Vec<(String, bool, Node)>),
}

pub(crate) fn render(inner: &ContainerInner) -> String {
    if inner.is_closed() {
        return "Container (closed)".to_string();
    }
    let mode = if inner.config.path.is_some() {
        inner.config.mode.as_str()
    } else {
        "memory"
    };
    let not_saved = if inner.dirty.is_empty() {
        ""
    } else {
        " (not saved)"
    };
    let mut out = format!("Container ({mode}){not_saved}:\n");
    let loaded = structure(&inner.table, "", MAX_DEPTH, &inner.locks, true);
    write_group(&mut out, &loaded, 0);

    let unloaded: Vec<String> = inner
        .table
        .iter()
        .filter(|(_, e)| !e.is_loaded())
        .map(|(name, _)| quote(name))
        .collect();
    out.push_str(&format!("\nUnloaded keys: {{{}}}", unloaded.join(", ")));
    out
}

fn structure(
    table: &EntryTable,
    prefix: &str,
    depth: usize,
    locks: &KeyLock,
    top_level: bool,
) -> Vec<(String, bool, Node)> {
    let mut nodes = Vec::new();
    for (name, entry) in table.iter() {
        let path = key::join(prefix, name);
        let node = match &entry.slot {
            // listed in the trailer instead
            Slot::Unloaded if top_level => continue,
            Slot::Unloaded => Node::Leaf("not loaded".to_string()),
            Slot::Value(value) => Node::Leaf(describe(value)),
            Slot::Group(inner) if inner.is_empty() => Node::Leaf("empty map".to_string()),
            Slot::Group(inner) if depth <= 1 || inner.len() > MAX_CHILDREN => {
                Node::Leaf("variable of type map".to_string())
            }
            Slot::Group(inner) => Node::Group(structure(inner, &path, depth - 1, locks, false)),
        };
        nodes.push((name.to_string(), locks.is_locked(&path), node));
    }
    nodes
}

fn write_group(out: &mut String, nodes: &[(String, bool, Node)], level: usize) {
    if nodes.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{\n");
    for (i, (name, is_locked, node)) in nodes.iter().enumerate() {
        out.push_str(&" ".repeat((level + 1) * INDENT));
        out.push_str(&quote(name));
        if *is_locked {
            out.push_str(" (r)");
        }
        out.push_str(": ");
        match node {
            Node::Leaf(text) => out.push_str(&quote(text)),
            Node::Group(children) => write_group(out, children, level + 1),
        }
        if i + 1 < nodes.len() {
            out.push(',');
        }
        out.push('\n');
    }
    out.push_str(&" ".repeat(level * INDENT));
    out.push('}');
}

fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{text}\""))
}

fn describe(value: &Value) -> String {
    match value {
        Value::Int(n) => format!("{n} (type: i64)"),
        Value::Float(x) => format!("{} (type: f64)", format_float(*x)),
        Value::Bool(b) => format!("{b} (type: bool)"),
        Value::Array(arr) => format!(
            "shape: {} (dtype: {})",
            format_shape(arr.shape()),
            arr.dtype()
        ),
        other => format!("variable of type {}", other.type_name()),
    }
}

fn format_float(x: f64) -> String {
    if (0.1..=100.0).contains(&x.abs()) {
        format!("{x:.3}")
    } else {
        format!("{x:.3e}")
    }
}

fn format_shape(shape: &[usize]) -> String {
    match shape {
        [n] => format!("({n},)"),
        dims => format!(
            "({})",
            dims.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
