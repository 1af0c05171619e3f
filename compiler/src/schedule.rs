// schedule.rs — Deterministic step schedule over the frame IR
//
// Turns a lowered patch into an executable program. Every expression that
// feeds an export or a state latch gets a storage slot and a position in
// the step list; memoized expressions nothing live reaches are dropped
// here, not evaluated. Ordering is a Kahn walk over both expression
// tables with a BTreeSet ready set, so ties break by table and id and the
// same tables always produce the same steps.
//
// Preconditions:
//  - Lowering verified L1-L4: tables are in-bounds and append-ordered.
// Postconditions:
//  - `ScheduleResult.program` holds the frozen tables, the step list, and
//    the per-expression slot maps; `fingerprint()` is byte-stable across
//    runs and machines for equal tables.
// Failure modes:
//  - S-obligation violations surface as E0603 diagnostics against the
//    patch; the program is still returned for inspection.
// Side effects:
//  - None. The schedule pass allocates slots but touches no state outside
//    the program it returns.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::canon::Binding;
use crate::diag::{codes, Diagnostic, Origin};
use crate::id::{BlockId, ExprId, FieldExprId, SlotId, StateId, ValueExprId};
use crate::ir::{Expr, IrTables, SlotDecl};
use crate::lower::LoweredPatch;
use crate::pass::StageCert;

// ── Steps ────────────────────────────────────────────────────────────────

/// One executable step of a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Evaluate a per-frame expression into its slot.
    EvalValue { expr: ValueExprId, slot: SlotId },
    /// Evaluate a per-element expression into its strided slot.
    Materialize { expr: FieldExprId, slot: SlotId },
    /// Latch a state cell from an already-evaluated expression. Runs after
    /// every evaluation step; reads in the same frame saw the old value.
    WriteState { state: StateId, src: ExprId },
}

/// A scheduled program: frozen tables plus the ordered step list.
///
/// `value_slots[i]` / `field_slots[i]` give the storage slot of the
/// expression the schedule computes, `None` for dead memoized entries.
#[derive(Debug)]
pub struct CompiledProgram {
    pub tables: IrTables,
    pub steps: Vec<Step>,
    pub value_slots: Vec<Option<SlotId>>,
    pub field_slots: Vec<Option<SlotId>>,
}

impl CompiledProgram {
    pub fn slot_of(&self, id: ExprId) -> Option<SlotId> {
        match id {
            ExprId::Value(v) => self.value_slots[v.0 as usize],
            ExprId::Field(fe) => self.field_slots[fe.0 as usize],
        }
    }

    /// Content hash over the full program dump. Two compiles that produce
    /// equal tables produce equal fingerprints.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        hasher.finalize().into()
    }

    /// Reverse lookups from program parts back to patch blocks, for
    /// debuggers and editors.
    pub fn debug_index(&self) -> DebugIndex {
        let mut slot_writer = vec![None; self.tables.slots.len()];
        for step in &self.steps {
            match *step {
                Step::EvalValue { expr, slot } => {
                    slot_writer[slot.0 as usize] = Some(ExprId::Value(expr));
                }
                Step::Materialize { expr, slot } => {
                    slot_writer[slot.0 as usize] = Some(ExprId::Field(expr));
                }
                Step::WriteState { .. } => {}
            }
        }
        DebugIndex {
            value_expr_block: self.tables.value_origin.clone(),
            field_expr_block: self.tables.field_origin.clone(),
            slot_writer,
        }
    }
}

/// Where program parts came from: the block behind each expression, the
/// expression behind each slot.
#[derive(Debug)]
pub struct DebugIndex {
    /// Originating block per value expression, `None` for glue built
    /// outside any block's lowering.
    pub value_expr_block: Vec<Option<BlockId>>,
    pub field_expr_block: Vec<Option<BlockId>>,
    /// The expression whose step fills each slot.
    pub slot_writer: Vec<Option<ExprId>>,
}

impl DebugIndex {
    pub fn block_of(&self, id: ExprId) -> Option<BlockId> {
        match id {
            ExprId::Value(v) => self.value_expr_block[v.0 as usize],
            ExprId::Field(fe) => self.field_expr_block[fe.0 as usize],
        }
    }

    pub fn writer_of(&self, slot: SlotId) -> Option<ExprId> {
        self.slot_writer[slot.0 as usize]
    }

    /// The block a step serves: whichever block originated the expression
    /// it evaluates or latches.
    pub fn step_block(&self, step: Step) -> Option<BlockId> {
        match step {
            Step::EvalValue { expr, .. } => self.block_of(ExprId::Value(expr)),
            Step::Materialize { expr, .. } => self.block_of(ExprId::Field(expr)),
            Step::WriteState { src, .. } => self.block_of(src),
        }
    }
}

impl fmt::Display for CompiledProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tables)?;
        writeln!(f, "steps:")?;
        for (i, step) in self.steps.iter().enumerate() {
            match *step {
                Step::EvalValue { expr, slot } => {
                    writeln!(f, "  {}: eval v{} -> s{}", i, expr.0, slot.0)?;
                }
                Step::Materialize { expr, slot } => {
                    write!(f, "  {}: materialize f{} -> s{}", i, expr.0, slot.0)?;
                    match self.tables.field_exprs[expr.0 as usize].ty.extent.binding {
                        Binding::Bound(inst) => writeln!(f, " over i{}", inst.0)?,
                        Binding::Free => writeln!(f)?,
                    }
                }
                Step::WriteState { state, src } => {
                    writeln!(f, "  {}: latch st{} <- {}", i, state.0, src)?;
                }
            }
        }
        Ok(())
    }
}

// ── Cert ─────────────────────────────────────────────────────────────────

/// Evidence the schedule satisfies its stage obligations.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleCert {
    /// Every live expression is scheduled exactly once, with a slot, and
    /// nothing dead is scheduled.
    pub s1_live_covered: bool,
    /// Every step's operands are scheduled before it.
    pub s2_operands_first: bool,
    /// State latches run after all evaluation, once per recorded write,
    /// from the state's own domain.
    pub s3_latches_sound: bool,
}

impl StageCert for ScheduleCert {
    fn all_pass(&self) -> bool {
        self.s1_live_covered && self.s2_operands_first && self.s3_latches_sound
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("S1 live expressions covered", self.s1_live_covered),
            ("S2 operands before consumers", self.s2_operands_first),
            ("S3 sound state latches", self.s3_latches_sound),
        ]
    }
}

/// Outcome of the schedule pass.
#[derive(Debug)]
pub struct ScheduleResult {
    pub program: CompiledProgram,
    pub cert: ScheduleCert,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Liveness ─────────────────────────────────────────────────────────────

struct Liveness {
    values: Vec<bool>,
    fields: Vec<bool>,
}

impl Liveness {
    /// Live ids, values first, each table in index order.
    fn iter(&self) -> impl Iterator<Item = ExprId> + '_ {
        let values = self
            .values
            .iter()
            .enumerate()
            .filter(|(_, live)| **live)
            .map(|(i, _)| ExprId::Value(ValueExprId(i as u32)));
        let fields = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, live)| **live)
            .map(|(i, _)| ExprId::Field(FieldExprId(i as u32)));
        values.chain(fields)
    }
}

/// Transitive operand closure of the given roots. State reads have no
/// operands, so a delay loop's closure stops at the previous-frame read.
fn live_set(
    value_exprs: &[Expr],
    field_exprs: &[Expr],
    roots: impl IntoIterator<Item = ExprId>,
) -> Liveness {
    let mut live = Liveness {
        values: vec![false; value_exprs.len()],
        fields: vec![false; field_exprs.len()],
    };
    let mut stack: Vec<ExprId> = roots.into_iter().collect();
    while let Some(id) = stack.pop() {
        let seen = match id {
            ExprId::Value(v) => std::mem::replace(&mut live.values[v.0 as usize], true),
            ExprId::Field(fe) => std::mem::replace(&mut live.fields[fe.0 as usize], true),
        };
        if seen {
            continue;
        }
        let kind = match id {
            ExprId::Value(v) => &value_exprs[v.0 as usize].kind,
            ExprId::Field(fe) => &field_exprs[fe.0 as usize].kind,
        };
        stack.extend(kind.children());
    }
    live
}

fn live_roots(tables: &IrTables) -> impl Iterator<Item = ExprId> + '_ {
    tables
        .exports
        .iter()
        .map(|e| e.expr)
        .chain(tables.state_writes.iter().map(|w| w.src))
}

// ── Scheduling ───────────────────────────────────────────────────────────

/// Order the live expressions of a lowered patch into an executable step
/// list and assign each a storage slot.
pub fn schedule(lowered: LoweredPatch) -> ScheduleResult {
    let LoweredPatch { ir, .. } = lowered;
    let mut tables = ir.into_tables();
    debug!(
        values = tables.value_exprs.len(),
        fields = tables.field_exprs.len(),
        states = tables.states.len(),
        "scheduling"
    );

    let live = live_set(
        &tables.value_exprs,
        &tables.field_exprs,
        live_roots(&tables).collect::<Vec<_>>(),
    );

    // Degrees over the live subgraph. Operands may repeat (mix(a, a, t));
    // both sides of the count treat each occurrence as one edge.
    let mut indegree: BTreeMap<ExprId, usize> = BTreeMap::new();
    let mut consumers: BTreeMap<ExprId, Vec<ExprId>> = BTreeMap::new();
    let mut ready: BTreeSet<ExprId> = BTreeSet::new();
    for id in live.iter() {
        let children = tables.expr(id).kind.children();
        indegree.insert(id, children.len());
        if children.is_empty() {
            ready.insert(id);
        }
        for child in children {
            consumers.entry(child).or_default().push(id);
        }
    }

    let mut steps = Vec::with_capacity(indegree.len() + tables.state_writes.len());
    let mut value_slots: Vec<Option<SlotId>> = vec![None; tables.value_exprs.len()];
    let mut field_slots: Vec<Option<SlotId>> = vec![None; tables.field_exprs.len()];

    while let Some(id) = ready.pop_first() {
        let stride = tables.expr(id).ty.stride();
        let slot = SlotId(tables.slots.len() as u32);
        tables.slots.push(SlotDecl { stride });
        match id {
            ExprId::Value(v) => {
                value_slots[v.0 as usize] = Some(slot);
                steps.push(Step::EvalValue { expr: v, slot });
            }
            ExprId::Field(fe) => {
                field_slots[fe.0 as usize] = Some(slot);
                steps.push(Step::Materialize { expr: fe, slot });
            }
        }
        if let Some(users) = consumers.get(&id) {
            for &user in users {
                if let Some(d) = indegree.get_mut(&user) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(user);
                    }
                }
            }
        }
    }

    // Latches close the frame, in state order. A cyclic live subgraph
    // leaves expressions unscheduled; S1 reports them below.
    let mut latches: Vec<(StateId, ExprId)> = tables
        .state_writes
        .iter()
        .map(|w| (w.state, w.src))
        .collect();
    latches.sort_by_key(|&(state, _)| state);
    for (state, src) in latches {
        steps.push(Step::WriteState { state, src });
    }

    let program = CompiledProgram {
        tables,
        steps,
        value_slots,
        field_slots,
    };
    let mut diagnostics = Vec::new();
    let cert = verify_with_diagnostics(&program, &mut diagnostics);
    debug!(
        steps = program.steps.len(),
        slots = program.tables.slots.len(),
        ok = cert.all_pass(),
        "schedule complete"
    );
    ScheduleResult {
        program,
        cert,
        diagnostics,
    }
}

// ── Verification ─────────────────────────────────────────────────────────

/// Re-derive the cert from a finished program.
pub fn verify_schedule(program: &CompiledProgram) -> ScheduleCert {
    ScheduleCert {
        s1_live_covered: s1_violations(program).is_empty(),
        s2_operands_first: s2_violations(program).is_empty(),
        s3_latches_sound: s3_violations(program).is_empty(),
    }
}

fn verify_with_diagnostics(
    program: &CompiledProgram,
    diagnostics: &mut Vec<Diagnostic>,
) -> ScheduleCert {
    let s1 = s1_violations(program);
    let s2 = s2_violations(program);
    let s3 = s3_violations(program);
    for (label, violations) in [
        ("S1 live expressions covered", &s1),
        ("S2 operands before consumers", &s2),
        ("S3 sound state latches", &s3),
    ] {
        for v in violations {
            diagnostics.push(Diagnostic::error(
                codes::SCHEDULE_CERT_FAILED,
                Origin::Patch,
                format!("schedule verification failed ({}): {}", label, v),
            ));
        }
    }
    ScheduleCert {
        s1_live_covered: s1.is_empty(),
        s2_operands_first: s2.is_empty(),
        s3_latches_sound: s3.is_empty(),
    }
}

fn coverage_violations(
    prefix: char,
    counts: &[usize],
    live: &[bool],
    slots: &[Option<SlotId>],
    out: &mut Vec<String>,
) {
    for (i, &n) in counts.iter().enumerate() {
        match (live[i], n) {
            (true, 0) => out.push(format!("{}{} is live but never scheduled", prefix, i)),
            (true, 1) if slots[i].is_none() => {
                out.push(format!("{}{} scheduled without a slot", prefix, i))
            }
            (true, 1) => {}
            (true, _) => out.push(format!("{}{} scheduled {} times", prefix, i, n)),
            (false, 0) => {}
            (false, _) => out.push(format!("{}{} is dead but scheduled", prefix, i)),
        }
    }
}

fn s1_violations(program: &CompiledProgram) -> Vec<String> {
    let t = &program.tables;
    let live = live_set(
        &t.value_exprs,
        &t.field_exprs,
        live_roots(t).collect::<Vec<_>>(),
    );
    let mut evals_v = vec![0usize; t.value_exprs.len()];
    let mut evals_f = vec![0usize; t.field_exprs.len()];
    for step in &program.steps {
        match *step {
            Step::EvalValue { expr, .. } => evals_v[expr.0 as usize] += 1,
            Step::Materialize { expr, .. } => evals_f[expr.0 as usize] += 1,
            Step::WriteState { .. } => {}
        }
    }
    let mut out = Vec::new();
    coverage_violations('v', &evals_v, &live.values, &program.value_slots, &mut out);
    coverage_violations('f', &evals_f, &live.fields, &program.field_slots, &mut out);
    out
}

fn s2_violations(program: &CompiledProgram) -> Vec<String> {
    let t = &program.tables;
    let mut done_v = vec![false; t.value_exprs.len()];
    let mut done_f = vec![false; t.field_exprs.len()];
    let done = |id: ExprId, dv: &[bool], df: &[bool]| match id {
        ExprId::Value(v) => dv[v.0 as usize],
        ExprId::Field(fe) => df[fe.0 as usize],
    };
    let mut out = Vec::new();
    for (i, step) in program.steps.iter().enumerate() {
        let id = match *step {
            Step::EvalValue { expr, .. } => ExprId::Value(expr),
            Step::Materialize { expr, .. } => ExprId::Field(expr),
            Step::WriteState { src, .. } => {
                if !done(src, &done_v, &done_f) {
                    out.push(format!("step {} latches {} before it is evaluated", i, src));
                }
                continue;
            }
        };
        for child in t.expr(id).kind.children() {
            if !done(child, &done_v, &done_f) {
                out.push(format!(
                    "step {} runs {} before its operand {}",
                    i, id, child
                ));
            }
        }
        match id {
            ExprId::Value(v) => done_v[v.0 as usize] = true,
            ExprId::Field(fe) => done_f[fe.0 as usize] = true,
        }
    }
    out
}

fn s3_violations(program: &CompiledProgram) -> Vec<String> {
    let t = &program.tables;
    let mut out = Vec::new();

    if let Some(first) = program
        .steps
        .iter()
        .position(|s| matches!(s, Step::WriteState { .. }))
    {
        for (i, step) in program.steps.iter().enumerate().skip(first) {
            if !matches!(step, Step::WriteState { .. }) {
                out.push(format!("step {} evaluates after state latches begin", i));
            }
        }
    }

    let mut latched = vec![0usize; t.states.len()];
    for step in &program.steps {
        if let Step::WriteState { state, src } = *step {
            latched[state.0 as usize] += 1;
            let per_element = t.states[state.0 as usize].instance.is_some();
            if per_element != matches!(src, ExprId::Field(_)) {
                out.push(format!(
                    "st{} latches from the wrong table ({})",
                    state.0, src
                ));
            }
            if program.slot_of(src).is_none() {
                out.push(format!("st{} latches from unscheduled {}", state.0, src));
            }
        }
    }
    let mut recorded = vec![0usize; t.states.len()];
    for w in &t.state_writes {
        recorded[w.state.0 as usize] += 1;
    }
    for (i, &got) in latched.iter().enumerate() {
        if got != recorded[i] {
            out.push(format!(
                "st{} has {} recorded writes but {} latch steps",
                i, recorded[i], got
            ));
        }
        if got > 1 {
            out.push(format!("st{} latched more than once", i));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::{ConcreteType, Payload};
    use crate::id::BlockId;
    use crate::ir::{kernels, IntrinsicChannel, IrBuilder};
    use crate::value::Value;

    fn sig() -> ConcreteType {
        ConcreteType::signal(Payload::Float)
    }

    fn patch(ir: IrBuilder) -> LoweredPatch {
        LoweredPatch {
            ir,
            port_types: Vec::new(),
            block_instances: Vec::new(),
        }
    }

    #[test]
    fn operands_run_before_consumers_and_exports_get_slots() {
        let mut ir = IrBuilder::new();
        let t = ir.value_time(sig());
        let freq = ir.value_const(Value::Scalar(2.0), sig());
        let wave = ir.value_kernel(kernels::MUL, &[t, freq], sig());
        ir.export("wave", wave.into(), BlockId(0));

        let result = schedule(patch(ir));
        assert!(result.diagnostics.is_empty());
        assert!(result.cert.all_pass());

        let program = result.program;
        assert_eq!(program.steps.len(), 3);
        assert!(matches!(
            program.steps[2],
            Step::EvalValue { expr, .. } if expr == wave
        ));
        assert!(program.slot_of(wave.into()).is_some());
        assert_eq!(program.tables.slots.len(), 3);
    }

    #[test]
    fn dead_memoized_exprs_are_not_scheduled() {
        let mut ir = IrBuilder::new();
        let used = ir.value_const(Value::Scalar(1.0), sig());
        let dead = ir.value_const(Value::Scalar(9.0), sig());
        ir.export("out", used.into(), BlockId(0));

        let result = schedule(patch(ir));
        assert!(result.cert.all_pass());
        assert_eq!(result.program.steps.len(), 1);
        assert_eq!(result.program.slot_of(dead.into()), None);
    }

    #[test]
    fn field_steps_interleave_with_their_value_consumers() {
        let mut ir = IrBuilder::new();
        let inst = ir.alloc_instance(BlockId(0), 8, "cloud");
        let fld = ConcreteType::field(Payload::Float, inst);
        let idx = ir.field_source(inst, IntrinsicChannel::Index, fld);
        let peak = ir.fold(kernels::MAX, idx, sig());
        let half = ir.value_const(Value::Scalar(0.5), sig());
        let scaled = ir.value_kernel(kernels::MUL, &[peak, half], sig());
        ir.export("peak", scaled.into(), BlockId(1));

        let result = schedule(patch(ir));
        assert!(result.cert.all_pass());
        let program = result.program;

        let idx_slot = program.slot_of(idx.into()).unwrap();
        let mat = program
            .steps
            .iter()
            .position(|s| {
                *s == Step::Materialize {
                    expr: idx,
                    slot: idx_slot,
                }
            })
            .unwrap();
        let fold = program
            .steps
            .iter()
            .position(|s| matches!(s, Step::EvalValue { expr, .. } if *expr == peak))
            .unwrap();
        let mul = program
            .steps
            .iter()
            .position(|s| matches!(s, Step::EvalValue { expr, .. } if *expr == scaled))
            .unwrap();
        assert!(mat < fold && fold < mul);
        assert_eq!(program.tables.slots[idx_slot.0 as usize].stride, 1);
    }

    #[test]
    fn latches_run_after_all_evaluation() {
        let mut ir = IrBuilder::new();
        let st = ir.alloc_state(1, None, 0.0);
        let prev = ir.state_read(st, sig());
        let prev_v = match prev {
            ExprId::Value(v) => v,
            ExprId::Field(_) => unreachable!("single state reads into the value table"),
        };
        let one = ir.value_const(Value::Scalar(1.0), sig());
        let next = ir.value_kernel(kernels::ADD, &[prev_v, one], sig());
        ir.note_state_write(st, next.into());
        ir.export("count", prev, BlockId(0));

        let result = schedule(patch(ir));
        assert!(result.diagnostics.is_empty());
        assert!(result.cert.all_pass());

        let program = result.program;
        assert!(matches!(
            program.steps.last(),
            Some(Step::WriteState { state, src })
                if *state == st && *src == ExprId::Value(next)
        ));
        // The latch source is live even though no export reaches it.
        assert!(program.slot_of(next.into()).is_some());
    }

    #[test]
    fn debug_index_maps_back_to_blocks() {
        let mut ir = IrBuilder::new();
        ir.set_current_block(Some(BlockId(3)));
        let t = ir.value_time(sig());
        ir.set_current_block(Some(BlockId(5)));
        let freq = ir.value_const(Value::Scalar(2.0), sig());
        let wave = ir.value_kernel(kernels::MUL, &[t, freq], sig());
        ir.set_current_block(None);
        ir.export("wave", wave.into(), BlockId(5));

        let program = schedule(patch(ir)).program;
        let index = program.debug_index();

        assert_eq!(index.block_of(t.into()), Some(BlockId(3)));
        assert_eq!(index.block_of(freq.into()), Some(BlockId(5)));
        let wave_slot = program.slot_of(wave.into()).unwrap();
        assert_eq!(index.writer_of(wave_slot), Some(ExprId::Value(wave)));
        assert_eq!(
            index.step_block(*program.steps.last().unwrap()),
            Some(BlockId(5))
        );
    }

    #[test]
    fn identical_tables_produce_identical_fingerprints() {
        let build = || {
            let mut ir = IrBuilder::new();
            let t = ir.value_time(sig());
            let three = ir.value_const(Value::Scalar(3.0), sig());
            let sum = ir.value_kernel(kernels::ADD, &[t, three], sig());
            ir.export("sum", sum.into(), BlockId(0));
            schedule(patch(ir)).program
        };
        let a = build();
        let b = build();
        assert_eq!(a.steps, b.steps);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn reordered_steps_fail_the_order_obligation() {
        let mut ir = IrBuilder::new();
        let t = ir.value_time(sig());
        let freq = ir.value_const(Value::Scalar(2.0), sig());
        let wave = ir.value_kernel(kernels::MUL, &[t, freq], sig());
        ir.export("wave", wave.into(), BlockId(0));

        let mut program = schedule(patch(ir)).program;
        program.steps.swap(0, 2);
        let cert = verify_schedule(&program);
        assert!(!cert.s2_operands_first);
        assert!(cert.s1_live_covered);
    }

    #[test]
    fn duplicate_latch_fails_the_latch_obligation() {
        let mut ir = IrBuilder::new();
        let st = ir.alloc_state(1, None, 0.0);
        let prev = ir.state_read(st, sig());
        ir.note_state_write(st, prev);
        ir.export("held", prev, BlockId(0));

        let mut program = schedule(patch(ir)).program;
        assert!(verify_schedule(&program).s3_latches_sound);
        program.steps.push(Step::WriteState {
            state: st,
            src: prev,
        });
        let cert = verify_schedule(&program);
        assert!(!cert.s3_latches_sound);
        assert!(cert.s2_operands_first);
    }

    #[test]
    fn dump_lists_steps_after_tables() {
        let mut ir = IrBuilder::new();
        let st = ir.alloc_state(1, None, 0.0);
        let prev = ir.state_read(st, sig());
        let prev_v = match prev {
            ExprId::Value(v) => v,
            ExprId::Field(_) => unreachable!("single state reads into the value table"),
        };
        let one = ir.value_const(Value::Scalar(1.0), sig());
        let next = ir.value_kernel(kernels::ADD, &[prev_v, one], sig());
        ir.note_state_write(st, next.into());
        ir.export("count", prev, BlockId(0));

        let dump = schedule(patch(ir)).program.to_string();
        assert!(dump.contains("steps:"));
        assert!(dump.contains("0: eval v0 -> s0"));
        assert!(dump.contains("latch st0 <- v2"));
        assert!(dump.contains("exports:"));
    }
}
