// exec.rs — Reference frame driver for compiled programs
//
// Walks the step list once per frame, reading operands out of slots the
// schedule guarantees were filled earlier. Nothing here recurses into the
// expression tables at runtime: every operand is a slot read, every result
// a slot write, so a frame costs exactly one pass over the steps. A replay
// cursor exposes the same walk one step at a time for debuggers.
//
// Preconditions:
//  - The program came out of an error-free compile; the S obligations hold.
// Postconditions:
//  - After `run_frame`, every export's slot holds this frame's value and
//    every state cell holds the value the next frame will read.
// Failure modes:
//  - None per frame. Missing externals read zero (warned once per name);
//    empty folds read zero; division by zero yields zero in the kernels.
// Side effects:
//  - Slot and state buffers mutate in place. A warning is logged the first
//    time an unbound external is read.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use tracing::{trace, warn};

use crate::canon::Binding;
use crate::id::{ExprId, FieldExprId, InstanceId, StateId, ValueExprId};
use crate::ir::{Expr, ExprKind, IntrinsicChannel, KernelOp, PathDerivKind};
use crate::schedule::{CompiledProgram, Step};
use crate::value::{FrameCtx, Value};

// ── Frame outputs ────────────────────────────────────────────────────────

/// One export's value for a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputData {
    Signal(Value),
    /// Flattened per-element data: element `i` occupies lanes
    /// `[i*stride .. (i+1)*stride]`. `ids` carries each element's stable
    /// identity for cross-frame mapping.
    Field {
        stride: u32,
        ids: Vec<u64>,
        data: Vec<f64>,
    },
}

impl OutputData {
    pub fn as_signal(&self) -> Option<Value> {
        match self {
            OutputData::Signal(v) => Some(*v),
            OutputData::Field { .. } => None,
        }
    }

    pub fn element_count(&self) -> usize {
        match self {
            OutputData::Signal(_) => 1,
            OutputData::Field { stride, data, .. } => data.len() / (*stride).max(1) as usize,
        }
    }
}

/// Everything one frame produced, keyed by export name in declaration
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutputs {
    pub frame: u64,
    pub outputs: IndexMap<String, OutputData>,
}

// ── Driver ───────────────────────────────────────────────────────────────

/// Owns the storage a program needs across frames: slot buffers, state
/// cells, per-domain element counts and identities, and host inputs.
pub struct FrameDriver {
    program: CompiledProgram,
    slots: Vec<Vec<f64>>,
    states: Vec<Vec<f64>>,
    counts: Vec<u32>,
    element_ids: Vec<Vec<u64>>,
    next_element_id: u64,
    externals: HashMap<String, Value>,
    missing_warned: BTreeSet<String>,
}

impl FrameDriver {
    pub fn new(program: CompiledProgram) -> FrameDriver {
        let counts: Vec<u32> = program
            .tables
            .instances
            .iter()
            .map(|i| i.default_count)
            .collect();

        let mut element_ids = Vec::with_capacity(counts.len());
        let mut next_element_id = 0u64;
        for &count in &counts {
            let mut ids = Vec::with_capacity(count as usize);
            for _ in 0..count {
                ids.push(next_element_id);
                next_element_id += 1;
            }
            element_ids.push(ids);
        }

        let states: Vec<Vec<f64>> = program
            .tables
            .states
            .iter()
            .map(|s| {
                let cells = match s.instance {
                    None => s.stride,
                    Some(inst) => s.stride * counts[inst.0 as usize],
                };
                vec![s.init; cells as usize]
            })
            .collect();

        let slots = vec![Vec::new(); program.tables.slots.len()];
        FrameDriver {
            program,
            slots,
            states,
            counts,
            element_ids,
            next_element_id,
            externals: HashMap::new(),
            missing_warned: BTreeSet::new(),
        }
    }

    pub fn program(&self) -> &CompiledProgram {
        &self.program
    }

    /// Bind a host input by name. A value of the wrong payload width reads
    /// as zero.
    pub fn set_external(&mut self, name: impl Into<String>, value: Value) {
        self.externals.insert(name.into(), value);
    }

    pub fn count(&self, instance: InstanceId) -> u32 {
        self.counts[instance.0 as usize]
    }

    /// Resize a domain. Surviving elements keep their identity and state;
    /// new elements get fresh ids and read state `init` until first latch.
    pub fn set_count(&mut self, instance: InstanceId, count: u32) {
        let idx = instance.0 as usize;
        if self.counts[idx] == count {
            return;
        }
        let ids = &mut self.element_ids[idx];
        if (count as usize) < ids.len() {
            ids.truncate(count as usize);
            // Drop dropped elements' cells so a later regrow reads init,
            // not a stranger's state.
            for (s, buf) in self.program.tables.states.iter().zip(&mut self.states) {
                if s.instance == Some(instance) {
                    buf.truncate((s.stride * count) as usize);
                }
            }
        } else {
            while ids.len() < count as usize {
                ids.push(self.next_element_id);
                self.next_element_id += 1;
            }
        }
        self.counts[idx] = count;
    }

    /// Evaluate one frame at the given clock and collect the exports.
    pub fn run_frame(&mut self, ctx: FrameCtx) -> FrameOutputs {
        trace!(frame = ctx.frame, t_ms = ctx.t_ms, "running frame");
        self.warn_missing_externals();
        for i in 0..self.program.steps.len() {
            self.exec_step(i, ctx);
        }
        self.collect_outputs(ctx)
    }

    /// Begin a step-at-a-time frame. Each `step()` executes one scheduled
    /// step and reports what it wrote; `finish()` collects the exports. A
    /// finished replay leaves the driver exactly as `run_frame` would have.
    pub fn replay(&mut self, ctx: FrameCtx) -> Replay<'_> {
        self.warn_missing_externals();
        Replay {
            driver: self,
            ctx,
            next: 0,
        }
    }

    fn exec_step(&mut self, i: usize, ctx: FrameCtx) {
        match self.program.steps[i] {
            Step::EvalValue { expr, slot } => {
                let v = self.eval_value(expr, ctx);
                let buf = &mut self.slots[slot.0 as usize];
                buf.resize(v.width(), 0.0);
                v.write_lanes(buf);
            }
            Step::Materialize { expr, slot } => {
                let mut buf = std::mem::take(&mut self.slots[slot.0 as usize]);
                self.fill_field(expr, &mut buf);
                self.slots[slot.0 as usize] = buf;
            }
            Step::WriteState { state, src } => {
                let Some(slot) = self.program.slot_of(src) else {
                    unreachable!("latch source {src} has no slot");
                };
                self.states[state.0 as usize].clone_from(&self.slots[slot.0 as usize]);
            }
        }
    }

    fn warn_missing_externals(&mut self) {
        for e in &self.program.tables.value_exprs {
            if let ExprKind::External { name } = &e.kind {
                if !self.externals.contains_key(name) && !self.missing_warned.contains(name) {
                    warn!(external = name.as_str(), "unbound external input reads 0");
                    self.missing_warned.insert(name.clone());
                }
            }
        }
    }

    // ── Value evaluation ──

    fn eval_value(&self, id: ValueExprId, ctx: FrameCtx) -> Value {
        let e = &self.program.tables.value_exprs[id.0 as usize];
        let width = e.ty.payload.width() as usize;
        match &e.kind {
            ExprKind::Const(v) => *v,
            ExprKind::Time => Value::Scalar(ctx.t_ms),
            ExprKind::External { name } => self
                .externals
                .get(name)
                .filter(|v| v.width() == width)
                .copied()
                .unwrap_or(Value::zero(width)),
            ExprKind::Kernel { op, children } => {
                let args: Vec<Value> = children.iter().map(|c| self.read_signal(*c)).collect();
                (op.eval)(&args)
            }
            ExprKind::Fold { op, child } => self.fold_field(*op, *child, width),
            ExprKind::Extract { child, component } => {
                let v = self.read_signal(*child);
                Value::Scalar(v.component(*component as usize).unwrap_or(0.0))
            }
            ExprKind::Construct { children } => {
                let mut lanes = Vec::with_capacity(width);
                for c in children {
                    let v = self.read_signal(*c);
                    for i in 0..v.width() {
                        lanes.push(v.component(i).unwrap_or(0.0));
                    }
                }
                lanes.resize(width, 0.0);
                Value::from_lanes(&lanes)
            }
            ExprKind::StateRead { state } => self.read_state_cell(*state, 0, width),
            ExprKind::Intrinsic { .. } | ExprKind::PathDerivative { .. } => {
                unreachable!("per-element expression in the value table")
            }
        }
    }

    fn read_signal(&self, id: ExprId) -> Value {
        let ExprId::Value(v) = id else {
            unreachable!("signal operand {id} lives in the field table");
        };
        let Some(slot) = self.program.value_slots[v.0 as usize] else {
            unreachable!("operand v{} was never scheduled", v.0);
        };
        let stride = self.program.tables.value_exprs[v.0 as usize]
            .ty
            .stride() as usize;
        Value::from_lanes(&self.slots[slot.0 as usize][..stride])
    }

    fn fold_field(&self, op: KernelOp, child: FieldExprId, width: usize) -> Value {
        let buf = self.field_slot(child);
        let stride = self.program.tables.field_exprs[child.0 as usize]
            .ty
            .stride() as usize;
        let count = buf.len() / stride.max(1);
        if count == 0 {
            return Value::zero(width);
        }
        let mut acc = Value::from_lanes(&buf[..stride]);
        for i in 1..count {
            let elem = Value::from_lanes(&buf[i * stride..(i + 1) * stride]);
            acc = (op.eval)(&[acc, elem]);
        }
        acc
    }

    // ── Field materialization ──

    fn fill_field(&self, id: FieldExprId, out: &mut Vec<f64>) {
        let e = &self.program.tables.field_exprs[id.0 as usize];
        let inst = field_instance(e);
        let count = self.counts[inst.0 as usize] as usize;
        let stride = e.ty.stride() as usize;
        out.clear();
        out.resize(count * stride, 0.0);

        match &e.kind {
            ExprKind::Intrinsic { instance, channel } => {
                let ids = &self.element_ids[instance.0 as usize];
                for i in 0..count {
                    out[i] = match channel {
                        IntrinsicChannel::Index => i as f64,
                        IntrinsicChannel::NormalizedIndex => {
                            if count <= 1 {
                                0.0
                            } else {
                                i as f64 / (count - 1) as f64
                            }
                        }
                        IntrinsicChannel::RandomId => unit_hash(ids[i]),
                    };
                }
            }
            ExprKind::Kernel { op, children } => {
                for i in 0..count {
                    let args: Vec<Value> =
                        children.iter().map(|c| self.read_lane(*c, i)).collect();
                    (op.eval)(&args).write_lanes(&mut out[i * stride..(i + 1) * stride]);
                }
            }
            ExprKind::Extract { child, component } => {
                for i in 0..count {
                    let v = self.read_lane(*child, i);
                    out[i] = v.component(*component as usize).unwrap_or(0.0);
                }
            }
            ExprKind::Construct { children } => {
                for i in 0..count {
                    let lanes = &mut out[i * stride..(i + 1) * stride];
                    let mut at = 0;
                    for c in children {
                        let v = self.read_lane(*c, i);
                        for k in 0..v.width() {
                            if at < lanes.len() {
                                lanes[at] = v.component(k).unwrap_or(0.0);
                                at += 1;
                            }
                        }
                    }
                }
            }
            ExprKind::StateRead { state } => {
                for i in 0..count {
                    let v = self.read_state_cell(*state, i, stride);
                    v.write_lanes(&mut out[i * stride..(i + 1) * stride]);
                }
            }
            ExprKind::PathDerivative { kind, child } => {
                self.fill_path_derivative(*kind, *child, count, stride, out);
            }
            ExprKind::Const(_)
            | ExprKind::Time
            | ExprKind::External { .. }
            | ExprKind::Fold { .. } => {
                unreachable!("per-frame expression in the field table")
            }
        }
    }

    /// Element `i` of a mixed operand: field children read their lane,
    /// value children broadcast.
    fn read_lane(&self, id: ExprId, i: usize) -> Value {
        match id {
            ExprId::Value(_) => self.read_signal(id),
            ExprId::Field(fe) => {
                let stride = self.program.tables.field_exprs[fe.0 as usize]
                    .ty
                    .stride() as usize;
                let buf = self.field_slot(fe);
                Value::from_lanes(&buf[i * stride..(i + 1) * stride])
            }
        }
    }

    fn field_slot(&self, id: FieldExprId) -> &[f64] {
        let Some(slot) = self.program.field_slots[id.0 as usize] else {
            unreachable!("operand f{} was never scheduled", id.0);
        };
        &self.slots[slot.0 as usize]
    }

    fn fill_path_derivative(
        &self,
        kind: PathDerivKind,
        child: FieldExprId,
        count: usize,
        stride: usize,
        out: &mut [f64],
    ) {
        let child_stride = self.program.tables.field_exprs[child.0 as usize]
            .ty
            .stride() as usize;
        let buf = self.field_slot(child);
        let elem = |i: usize| Value::from_lanes(&buf[i * child_stride..(i + 1) * child_stride]);

        match kind {
            PathDerivKind::Tangent => {
                // Cyclic central difference; a single element has no
                // neighborhood and reads zero.
                if count <= 1 {
                    return;
                }
                for i in 0..count {
                    let prev = elem((i + count - 1) % count);
                    let next = elem((i + 1) % count);
                    let d = next.zip(prev, |n, p| (n - p) * 0.5);
                    d.write_lanes(&mut out[i * stride..(i + 1) * stride]);
                }
            }
            PathDerivKind::ArcLength => {
                let mut acc = 0.0;
                for i in 1..count {
                    acc += elem(i).distance(&elem(i - 1));
                    out[i] = acc;
                }
            }
        }
    }

    fn read_state_cell(&self, state: StateId, element: usize, stride: usize) -> Value {
        let decl = self.program.tables.states[state.0 as usize];
        let buf = &self.states[state.0 as usize];
        let mut lanes = vec![0.0; stride];
        for (k, lane) in lanes.iter_mut().enumerate() {
            *lane = buf.get(element * stride + k).copied().unwrap_or(decl.init);
        }
        Value::from_lanes(&lanes)
    }

    // ── Export collection ──

    fn collect_outputs(&self, ctx: FrameCtx) -> FrameOutputs {
        let mut outputs = IndexMap::new();
        for export in &self.program.tables.exports {
            let data = match export.expr {
                ExprId::Value(_) => OutputData::Signal(self.read_signal(export.expr)),
                ExprId::Field(fe) => {
                    let e = &self.program.tables.field_exprs[fe.0 as usize];
                    let inst = field_instance(e);
                    OutputData::Field {
                        stride: e.ty.stride(),
                        ids: self.element_ids[inst.0 as usize].clone(),
                        data: self.field_slot(fe).to_vec(),
                    }
                }
            };
            outputs.insert(export.name.clone(), data);
        }
        FrameOutputs {
            frame: ctx.frame,
            outputs,
        }
    }
}

// ── Step replay ──────────────────────────────────────────────────────────

/// One step's effect, captured mid-frame for a debugger.
#[derive(Debug, Clone)]
pub struct StepSnapshot {
    pub index: usize,
    pub step: Step,
    /// The lanes the step wrote: its slot's contents, or the state cells
    /// for a latch.
    pub written: Vec<f64>,
}

/// Step-at-a-time execution of one frame. Values match `run_frame`
/// exactly; the cursor only adds observation points between steps.
pub struct Replay<'d> {
    driver: &'d mut FrameDriver,
    ctx: FrameCtx,
    next: usize,
}

impl Replay<'_> {
    /// Run the next step and report what it wrote; `None` once every step
    /// has run.
    pub fn step(&mut self) -> Option<StepSnapshot> {
        let i = self.next;
        if i >= self.driver.program.steps.len() {
            return None;
        }
        self.next += 1;
        self.driver.exec_step(i, self.ctx);
        let step = self.driver.program.steps[i];
        let written = match step {
            Step::EvalValue { slot, .. } | Step::Materialize { slot, .. } => {
                self.driver.slots[slot.0 as usize].clone()
            }
            Step::WriteState { state, .. } => self.driver.states[state.0 as usize].clone(),
        };
        Some(StepSnapshot {
            index: i,
            step,
            written,
        })
    }

    /// Run any steps not yet taken and collect the frame's exports.
    pub fn finish(mut self) -> FrameOutputs {
        while self.step().is_some() {}
        self.driver.collect_outputs(self.ctx)
    }
}

fn field_instance(e: &Expr) -> InstanceId {
    match e.ty.extent.binding {
        Binding::Bound(inst) => inst,
        Binding::Free => unreachable!("field expression with no bound domain"),
    }
}

/// SplitMix64 finalizer mapped onto [0, 1). Stable across platforms, so a
/// given element identity always reads the same random.
fn unit_hash(id: u64) -> f64 {
    let mut z = id.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::graph::{ConfigValue, Patch, PatchBuilder};
    use crate::lower::NullExpressionCompiler;
    use crate::pipeline::{compile, CompileOptions};

    fn driver(patch: &Patch) -> FrameDriver {
        let result = compile(
            patch,
            &catalog::standard(),
            &NullExpressionCompiler,
            CompileOptions::default(),
        );
        assert!(!result.has_errors(), "diagnostics: {:?}", result.diagnostics);
        FrameDriver::new(result.program.expect("program"))
    }

    fn signal(outputs: &FrameOutputs, name: &str) -> f64 {
        match outputs.outputs[name] {
            OutputData::Signal(Value::Scalar(v)) => v,
            ref other => panic!("expected a scalar signal, got {other:?}"),
        }
    }

    fn field(outputs: &FrameOutputs, name: &str) -> (Vec<u64>, Vec<f64>) {
        match &outputs.outputs[name] {
            OutputData::Field { ids, data, .. } => (ids.clone(), data.clone()),
            other => panic!("expected a field, got {other:?}"),
        }
    }

    #[test]
    fn adds_two_constants() {
        let patch = PatchBuilder::new()
            .block_with("a", "constant", &[("value", ConfigValue::Float(2.0))])
            .block_with("b", "constant", &[("value", ConfigValue::Float(3.0))])
            .block("sum", "add")
            .block("out", "output")
            .wire("a.out", "sum.a")
            .wire("b.out", "sum.b")
            .wire("sum.out", "out.in")
            .build();
        let out = driver(&patch).run_frame(FrameCtx::start());
        assert_eq!(signal(&out, "out"), 5.0);
    }

    #[test]
    fn time_drives_the_oscillator() {
        let patch = PatchBuilder::new()
            .block_with("hz", "constant", &[("value", ConfigValue::Float(0.25))])
            .block("wave", "osc")
            .block("out", "output")
            .wire("hz.out", "wave.freq")
            .wire("wave.out", "out.in")
            .build();
        let mut driver = driver(&patch);
        let at_zero = driver.run_frame(FrameCtx::start());
        assert!(signal(&at_zero, "out").abs() < 1e-9);
        // 0.25 Hz puts the quarter period at t = 1s.
        let at_second = driver.run_frame(FrameCtx::start().advanced(1000.0));
        assert!((signal(&at_second, "out") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fields_materialize_per_element() {
        let patch = PatchBuilder::new()
            .block_with("dots", "spawn", &[("count", ConfigValue::Int(4))])
            .block_with("gain", "constant", &[("value", ConfigValue::Float(3.0))])
            .block("scaled", "mul")
            .block("out", "output")
            .wire("dots.normalizedIndex", "scaled.a")
            .wire("gain.out", "scaled.b")
            .wire("scaled.out", "out.in")
            .build();
        let out = driver(&patch).run_frame(FrameCtx::start());
        let (ids, data) = field(&out, "out");
        assert_eq!(ids.len(), 4);
        let expected = [0.0, 1.0, 2.0, 3.0];
        for (got, want) in data.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "got {data:?}");
        }
    }

    #[test]
    fn reduce_folds_across_elements() {
        let patch = PatchBuilder::new()
            .block_with("dots", "spawn", &[("count", ConfigValue::Int(4))])
            .block_with("total", "reduce", &[("op", ConfigValue::Str("sum".into()))])
            .block("out", "output")
            .wire("dots.index", "total.in")
            .wire("total.out", "out.in")
            .build();
        let out = driver(&patch).run_frame(FrameCtx::start());
        assert_eq!(signal(&out, "out"), 6.0);
    }

    #[test]
    fn delay_accumulates_across_frames() {
        let patch = PatchBuilder::new()
            .block_with("step", "constant", &[("value", ConfigValue::Float(1.0))])
            .block("sum", "add")
            .block("held", "delay")
            .block("out", "output")
            .wire("step.out", "sum.a")
            .wire("held.out", "sum.b")
            .wire("sum.out", "held.in")
            .wire("sum.out", "out.in")
            .build();
        let mut driver = driver(&patch);
        let mut ctx = FrameCtx::start();
        for want in [1.0, 2.0, 3.0] {
            let out = driver.run_frame(ctx);
            assert_eq!(signal(&out, "out"), want);
            ctx = ctx.advanced(16.0);
        }
    }

    #[test]
    fn replay_matches_run_frame() {
        let patch = PatchBuilder::new()
            .block_with("step", "constant", &[("value", ConfigValue::Float(1.0))])
            .block("sum", "add")
            .block("held", "delay")
            .block("out", "output")
            .wire("step.out", "sum.a")
            .wire("held.out", "sum.b")
            .wire("sum.out", "held.in")
            .wire("sum.out", "out.in")
            .build();
        let mut direct = driver(&patch);
        let mut stepped = driver(&patch);
        let step_count = direct.program().steps.len();

        // State makes this sensitive to any divergence: a wrong write in
        // frame n shows up in every later frame.
        let mut ctx = FrameCtx::start();
        for _ in 0..3 {
            let want = direct.run_frame(ctx);

            let mut replay = stepped.replay(ctx);
            let mut snapshots = Vec::new();
            while let Some(s) = replay.step() {
                snapshots.push(s);
            }
            let got = replay.finish();

            assert_eq!(got, want);
            assert_eq!(snapshots.len(), step_count);
            for (i, s) in snapshots.iter().enumerate() {
                assert_eq!(s.index, i);
                assert!(!s.written.is_empty());
            }
            ctx = ctx.advanced(16.0);
        }
    }

    #[test]
    fn finish_runs_the_steps_not_yet_taken() {
        let patch = PatchBuilder::new()
            .block_with("hz", "constant", &[("value", ConfigValue::Float(0.25))])
            .block("wave", "osc")
            .block("out", "output")
            .wire("hz.out", "wave.freq")
            .wire("wave.out", "out.in")
            .build();
        let mut direct = driver(&patch);
        let mut stepped = driver(&patch);
        let want = direct.run_frame(FrameCtx::start());

        let mut replay = stepped.replay(FrameCtx::start());
        assert!(replay.step().is_some());
        assert_eq!(replay.finish(), want);
    }

    #[test]
    fn surviving_elements_keep_their_identity() {
        let patch = PatchBuilder::new()
            .block_with("dots", "spawn", &[("count", ConfigValue::Int(3))])
            .block("out", "output")
            .wire("dots.randomId", "out.in")
            .build();
        let mut driver = driver(&patch);
        let (before_ids, before) = field(&driver.run_frame(FrameCtx::start()), "out");

        driver.set_count(InstanceId(0), 5);
        let ctx = FrameCtx::start().advanced(16.0);
        let (after_ids, after) = field(&driver.run_frame(ctx), "out");

        assert_eq!(after_ids.len(), 5);
        assert_eq!(&after_ids[..3], &before_ids[..]);
        assert_eq!(&after[..3], &before[..]);
        // Fresh elements draw fresh identities.
        assert!(after_ids[3] > before_ids[2]);
        for v in &after {
            assert!((0.0..1.0).contains(v));
        }
    }

    #[test]
    fn missing_external_reads_zero_until_bound() {
        let patch = PatchBuilder::new()
            .block_with("knob", "external", &[("name", ConfigValue::Str("gain".into()))])
            .block("out", "output")
            .wire("knob.out", "out.in")
            .build();
        let mut driver = driver(&patch);
        let silent = driver.run_frame(FrameCtx::start());
        assert_eq!(signal(&silent, "out"), 0.0);

        driver.set_external("gain", Value::Scalar(0.7));
        let bound = driver.run_frame(FrameCtx::start().advanced(16.0));
        assert_eq!(signal(&bound, "out"), 0.7);
    }

    #[test]
    fn path_derivatives_walk_the_loop() {
        let patch = PatchBuilder::new()
            .block_with("dots", "spawn", &[("count", ConfigValue::Int(3))])
            .block_with("y", "constant", &[("value", ConfigValue::Float(0.0))])
            .block_with("z", "constant", &[("value", ConfigValue::Float(0.0))])
            .block("pos", "pack")
            .block("tan", "pathTangent")
            .block("len", "pathArcLength")
            .block("tangent", "output")
            .block("arc", "output")
            .wire("dots.normalizedIndex", "pos.x")
            .wire("y.out", "pos.y")
            .wire("z.out", "pos.z")
            .wire("pos.out", "tan.in")
            .wire("pos.out", "len.in")
            .wire("tan.out", "tangent.in")
            .wire("len.out", "arc.in")
            .build();
        let out = driver(&patch).run_frame(FrameCtx::start());

        // x positions are [0, 0.5, 1]; cyclic central difference on x.
        let (_, tan) = field(&out, "tangent");
        let tan_x: Vec<f64> = tan.chunks(3).map(|c| c[0]).collect();
        for (got, want) in tan_x.iter().zip([-0.25, 0.5, -0.25]) {
            assert!((got - want).abs() < 1e-12, "tangent x: {tan_x:?}");
        }

        let (_, arc) = field(&out, "arc");
        for (got, want) in arc.iter().zip([0.0, 0.5, 1.0]) {
            assert!((got - want).abs() < 1e-12, "arc: {arc:?}");
        }
    }
}
