//! Text and JSON emission for a finalized (or in-flight, for
//! `report_on_exit`) call tree (`spec.md` §4.7).
//!
//! Text output is a depth-first listing: rank prefix, tag, an indent that
//! grows with depth, the call-site key, each component's printed value,
//! and the lap count. JSON output mirrors the same tree as nested
//! `children` arrays so a consumer can rebuild the hierarchy without
//! re-parsing indentation.

use crate::bundle::Bundle;
use crate::error::{Error, Result};
use crate::manager::Manager;
use crate::storage::{NodeId, Storage};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Monotonically-growing column width so every label in a report lines up,
/// even though line lengths are only known as each node is visited
/// (`spec.md` §4.7 — "output-width hint").
static LABEL_WIDTH: AtomicUsize = AtomicUsize::new(0);

fn note_width(len: usize) {
    let mut current = LABEL_WIDTH.load(Ordering::Relaxed);
    while len > current {
        match LABEL_WIDTH.compare_exchange_weak(
            current,
            len,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

fn width() -> usize {
    LABEL_WIDTH.load(Ordering::Relaxed)
}

/// `  ` (two spaces) per level below the root, with the last unit replaced
/// by `|_` to mark the connector into this node.
fn indent_for_depth(depth: u32) -> String {
    if depth == 0 {
        return String::new();
    }
    let mut s = "  ".repeat((depth - 1) as usize);
    s.push_str("|_");
    s
}

fn format_label(tag: &str, depth: u32, key: &str, rank: Option<u32>) -> String {
    let rank = match rank {
        Some(r) => format!("[rank {}] ", r),
        None => String::new(),
    };
    format!("{rank}[{tag}]{}{key}", indent_for_depth(depth))
}

/// One report line for `bundle`, independent of any tree context — used
/// both by the finalize walk and by a scope's `report_on_exit` print.
pub(crate) fn format_node_line(bundle: &Bundle, rank: Option<u32>) -> String {
    let label = format_label(bundle.tag(), bundle.depth(), bundle.key(), rank);
    note_width(label.chars().count());
    let mut line = format!("{:<width$}", label, width = width());
    line.push(' ');
    bundle.print(&mut line).expect("writing to String is infallible");
    line
}

/// Print `bundle` under the manager's I/O lock — used by a scope whose
/// `report_on_exit` is set (`spec.md` §4.3).
pub(crate) fn emit_inline(bundle: &mut Bundle, manager: &Manager) {
    bundle.derive();
    let line = format_node_line(bundle, manager.rank_prefix());
    manager.with_io_lock(|| println!("{line}"));
}

fn text_report(storage: &Storage, manager: &Manager) -> String {
    let mut out = String::new();
    storage.walk(|id, node| {
        if id == storage.root() {
            return;
        }
        let mut bundle = node.accumulator().clone();
        bundle.derive();
        out.push_str(&format_node_line(&bundle, manager.rank_prefix()));
        out.push('\n');
    });
    out
}

fn json_report(storage: &Storage, rank: Option<u32>) -> Value {
    fn node_to_value(storage: &Storage, id: NodeId, rank: Option<u32>) -> Value {
        let node = storage.node(id);
        let mut bundle = node.accumulator().clone();
        bundle.derive();
        let mut obj = match bundle.serialize() {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        if let Some(rank) = rank {
            if let Some(Value::String(identifier)) = obj.get("identifier").cloned() {
                obj.insert("identifier".into(), Value::from(format!("[rank {rank}] {identifier}")));
            }
        }
        let children: Vec<Value> = node
            .children()
            .iter()
            .map(|&child| node_to_value(storage, child, rank))
            .collect();
        obj.insert("children".into(), Value::Array(children));
        Value::Object(obj)
    }
    node_to_value(storage, storage.root(), rank)
}

/// Write `<basename>.out` (text) and `<basename>.json` (archive) under
/// [`crate::settings::Settings::output_path`]. Both outputs are attempted
/// even if one fails; the first error encountered is returned.
pub(crate) fn write_outputs(storage: &Storage, manager: &Manager, basename: &Path) -> Result<()> {
    let settings = crate::settings::Settings::from_env();
    let base = settings.output_path.join(basename);
    if let Some(parent) = base.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut first_error: Option<Error> = None;

    let text_path = base.with_extension("out");
    let text = text_report(storage, manager);
    if let Err(e) = fs::File::create(&text_path).and_then(|mut f| f.write_all(text.as_bytes())) {
        log::warn!("failed to write {}: {e}", text_path.display());
        first_error.get_or_insert(Error::from(e));
    }

    let json_path = base.with_extension("json");
    let json = json_report(storage, manager.rank_prefix());
    let rendered = serde_json::to_vec_pretty(&json).unwrap_or_default();
    if let Err(e) = fs::File::create(&json_path).and_then(|mut f| f.write_all(&rendered)) {
        log::warn!("failed to write {}: {e}", json_path.display());
        first_error.get_or_insert(Error::from(e));
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
