// dot.rs — Graphviz DOT output for patches and compiled programs
//
// Renders a patch document as a block-and-wire diagram, and a compiled
// program as its expression dataflow, in DOT format suitable for
// rendering with `dot`, `neato`, or other Graphviz layout engines.
//
// Preconditions: none; unknown block types and dangling wires render
//   degraded rather than failing (validation owns those reports).
// Postconditions: returns a valid DOT string, deterministic per input.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::canon::Binding;
use crate::cardinality::CardinalityMode;
use crate::graph::{BlockInst, Patch};
use crate::id::InstanceId;
use crate::ir::{Expr, ExprKind};
use crate::registry::{BlockDef, Registry};
use crate::schedule::CompiledProgram;

/// Emit a patch as a Graphviz DOT string, one node per block.
pub fn emit_dot(patch: &Patch, registry: &Registry) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph flock {{").unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();
    writeln!(buf).unwrap();

    for (i, inst) in patch.blocks.iter().enumerate() {
        let attrs = block_attrs(inst, registry.lookup(&inst.block_type));
        writeln!(buf, "    b{i} [{attrs}];").unwrap();
    }

    writeln!(buf).unwrap();

    for wire in &patch.wires {
        // Dangling endpoints are a validation error, not a rendering one.
        let (Some(from), Some(to)) = (
            patch.block_index(&wire.from.block),
            patch.block_index(&wire.to.block),
        ) else {
            continue;
        };
        let label = escape_label(&format!("{} -> {}", wire.from.port, wire.to.port));
        let feeds_state = registry
            .lookup(&patch.block(to).block_type)
            .is_some_and(|d| d.feedback);
        if feeds_state {
            writeln!(
                buf,
                "    b{} -> b{} [label=\"{label}\", style=bold, color=blue];",
                from.0, to.0
            )
            .unwrap();
        } else {
            writeln!(buf, "    b{} -> b{} [label=\"{label}\"];", from.0, to.0).unwrap();
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

/// Emit a compiled program's expression tables as a Graphviz DOT string.
///
/// Per-frame expressions render as ellipses, per-element expressions as
/// boxes clustered by the domain they run over. State cells get the
/// cross-frame styling: what crosses a dashed red edge is a frame old.
pub fn emit_ir_dot(program: &CompiledProgram) -> String {
    let tables = &program.tables;
    let mut buf = String::new();
    writeln!(buf, "digraph flock_ir {{").unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();
    writeln!(buf).unwrap();

    for (i, e) in tables.value_exprs.iter().enumerate() {
        let label = escape_label(&expr_label(&e.kind));
        writeln!(
            buf,
            "    v{i} [shape=ellipse, style=filled, fillcolor=lightblue, label=\"{label}\"];"
        )
        .unwrap();
    }

    for (n, inst) in tables.instances.iter().enumerate() {
        writeln!(buf).unwrap();
        writeln!(buf, "    subgraph cluster_i{n} {{").unwrap();
        writeln!(
            buf,
            "        label=\"i{n}: {} x{}\";",
            escape_label(&inst.label),
            inst.default_count
        )
        .unwrap();
        writeln!(buf, "        style=rounded;").unwrap();
        writeln!(buf, "        color=gray50;").unwrap();
        for (i, e) in tables.field_exprs.iter().enumerate() {
            if e.ty.extent.binding != Binding::Bound(InstanceId(n as u32)) {
                continue;
            }
            let label = escape_label(&expr_label(&e.kind));
            writeln!(
                buf,
                "        f{i} [shape=box, style=filled, fillcolor=lightyellow, label=\"{label}\"];"
            )
            .unwrap();
        }
        writeln!(buf, "    }}").unwrap();
    }

    if !tables.states.is_empty() {
        writeln!(buf).unwrap();
        for (n, st) in tables.states.iter().enumerate() {
            writeln!(
                buf,
                "    st{n} [shape=cylinder, style=filled, fillcolor=lightsalmon, label=\"st{n} init {}\"];",
                st.init
            )
            .unwrap();
        }
    }

    if !tables.exports.is_empty() {
        writeln!(buf).unwrap();
        for (n, e) in tables.exports.iter().enumerate() {
            writeln!(
                buf,
                "    x{n} [shape=circle, style=filled, fillcolor=lightgreen, label=\"{}\"];",
                escape_label(&e.name)
            )
            .unwrap();
        }
    }

    writeln!(buf).unwrap();
    write_expr_edges(&mut buf, &tables.value_exprs, 'v');
    write_expr_edges(&mut buf, &tables.field_exprs, 'f');

    for w in &tables.state_writes {
        writeln!(
            buf,
            "    {} -> st{} [label=\"latch\", style=dashed, color=red, penwidth=2];",
            w.src, w.state.0
        )
        .unwrap();
    }

    for (n, e) in tables.exports.iter().enumerate() {
        writeln!(buf, "    {} -> x{n};", e.expr).unwrap();
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Escape a string for use inside a double-quoted DOT label.
fn escape_label(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// DOT attributes for a block node. Shape and fill follow the block's
/// role in the frame: spawners fan one lane out to many, feedback
/// blocks carry state across frames, sinks leave the graph.
fn block_attrs(inst: &BlockInst, def: Option<&BlockDef>) -> String {
    let (shape, color) = match def {
        None => ("box", "gray90"),
        Some(d) if d.feedback => ("cylinder", "lightsalmon"),
        Some(d) if matches!(d.cardinality_mode, CardinalityMode::Transform) => {
            ("diamond", "lightyellow")
        }
        Some(d) if d.signature.outputs.is_empty() => ("circle", "lightgreen"),
        Some(_) => ("box", "lightblue"),
    };
    let label = format!(
        "{}\\n{}",
        escape_label(&inst.name),
        escape_label(&inst.block_type)
    );
    format!("shape={shape}, style=filled, fillcolor={color}, label=\"{label}\"")
}

/// Short node label for an expression. Operands arrive as edges, so the
/// label carries only the operation itself.
fn expr_label(kind: &ExprKind) -> String {
    match kind {
        ExprKind::Const(v) => format!("const {}", v),
        ExprKind::Time => "time".to_string(),
        ExprKind::External { name } => format!("external '{}'", name),
        ExprKind::Kernel { op, .. } => op.name.to_string(),
        ExprKind::Fold { op, .. } => format!("fold {}", op.name),
        ExprKind::Intrinsic { instance, channel } => format!("i{}.{}", instance.0, channel),
        ExprKind::Extract { component, .. } => format!("extract [{}]", component),
        ExprKind::Construct { .. } => "construct".to_string(),
        ExprKind::StateRead { state } => format!("read st{}", state.0),
        ExprKind::PathDerivative { kind, .. } => format!("path.{}", kind),
    }
}

/// Child-to-parent edges for one expression table.
fn write_expr_edges(buf: &mut String, exprs: &[Expr], prefix: char) {
    for (i, e) in exprs.iter().enumerate() {
        for child in e.kind.children() {
            writeln!(buf, "    {child} -> {prefix}{i};").unwrap();
        }
        if let ExprKind::StateRead { state } = &e.kind {
            writeln!(
                buf,
                "    st{} -> {prefix}{i} [style=dashed, color=red, penwidth=2];",
                state.0
            )
            .unwrap();
        }
    }
}
