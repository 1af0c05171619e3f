// lower.rs — Lowering: blocks to frame IR, with verification
//
// Binds every block's signature to fresh axis variables, unifies wire
// constraints, then walks the blocks in dependency order: resolve output
// cardinality, infer the element domain, close remaining open axes over
// neutral defaults, and call the block's lowering function. Feedback blocks
// are released when the walk stalls, so delay loops lower without an order.
// Then verifies L1-L4 proof obligations.
//
// Preconditions: `Patch::validate` ran; its structural diagnostics stand.
// Postconditions: LowerResult with the populated IR builder, resolved port
//   types, and cert evidence for the U and L obligations.
// Failure modes: per-block failures and obligation violations produce
//   diagnostics; consumers of a failed block are skipped without a second
//   report.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;

use thiserror::Error;
use tracing::debug;

use crate::canon::{
    AxisKind, AxisSlot, AxisValue, Binding, Branch, Cardinality, ConcreteType, Perspective,
    Temporality, Unit, UnresolvedAxisVar,
};
use crate::cardinality::{resolve_output_cardinality, CardinalityError, CardinalityMode};
use crate::diag::{codes, has_errors, Diagnostic, Origin};
use crate::graph::{ConfigValue, Patch};
use crate::id::{BlockId, ExprId, FieldExprId, InstanceId, StateId, ValueExprId};
use crate::ir::{IrBuilder, IrError, KernelOp};
use crate::pass::StageCert;
use crate::registry::{BlockDef, PortType, Registry, SigInstance};
use crate::subst::{Substitution, TypeConflict, UnifyCert};

// ── Expression compiler seam ─────────────────────────────────────────────

/// A wired input exposed to an embedded expression, under its port name.
#[derive(Debug, Clone)]
pub struct ExprBinding {
    pub name: &'static str,
    pub expr: ExprId,
    pub ty: ConcreteType,
}

/// Failure report from an embedded expression frontend.
#[derive(Debug, Clone)]
pub struct ExprCompileError {
    pub message: String,
    /// Byte offset into the expression text, when known.
    pub position: Option<usize>,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ExprCompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(pos) = self.position {
            write!(f, " at byte {pos}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExprCompileError {}

/// Host-pluggable frontend for `expr`-style blocks. The implementation
/// must build an expression of exactly `out_ty`.
pub trait ExpressionCompiler {
    fn compile_expression(
        &self,
        text: &str,
        bindings: &[ExprBinding],
        out_ty: &ConcreteType,
        ir: &mut IrBuilder,
    ) -> Result<ExprId, ExprCompileError>;
}

/// Stand-in for hosts without an expression frontend.
pub struct NullExpressionCompiler;

impl ExpressionCompiler for NullExpressionCompiler {
    fn compile_expression(
        &self,
        _text: &str,
        _bindings: &[ExprBinding],
        _out_ty: &ConcreteType,
        _ir: &mut IrBuilder,
    ) -> Result<ExprId, ExprCompileError> {
        Err(ExprCompileError {
            message: "no expression compiler is installed".to_string(),
            position: None,
            suggestion: Some("remove the expression block or embed a host frontend".to_string()),
        })
    }
}

// ── Block-level failures ─────────────────────────────────────────────────

/// Why one block's lowering gave up. The engine maps each variant to a
/// coded diagnostic; lowering of the rest of the patch continues.
#[derive(Debug, Error)]
pub enum LowerFail {
    #[error("{0}")]
    Ir(#[from] IrError),
    #[error("config '{key}': {message}")]
    BadConfig { key: &'static str, message: String },
    #[error("{}", .0.message)]
    Expr(#[from] ExprCompileError),
    #[error("{0}")]
    Unresolved(#[from] UnresolvedAxisVar),
    #[error("{0}")]
    Conflict(#[from] TypeConflict),
    #[error("required input '{port}' is not wired")]
    MissingInput { port: &'static str },
}

// ── Lowering context ─────────────────────────────────────────────────────

/// One wired input whose producer already lowered.
#[derive(Debug, Clone)]
pub struct WiredInput {
    pub expr: ExprId,
    pub ty: ConcreteType,
}

/// What one block's lowering hands back to the engine.
#[derive(Debug, Default)]
pub struct LowerOutput {
    /// Expression per declared output port.
    pub outputs: BTreeMap<&'static str, ExprId>,
    /// Element domain this block created, if any.
    pub instance: Option<InstanceId>,
}

impl LowerOutput {
    pub fn single(name: &'static str, expr: impl Into<ExprId>) -> Self {
        LowerOutput::default().with(name, expr)
    }

    pub fn with(mut self, name: &'static str, expr: impl Into<ExprId>) -> Self {
        self.outputs.insert(name, expr.into());
        self
    }

    pub fn spawned(mut self, instance: InstanceId) -> Self {
        self.instance = Some(instance);
        self
    }
}

/// Everything a block's lowering function sees.
pub struct LowerCtx<'a> {
    pub block: BlockId,
    pub block_name: &'a str,
    pub config: &'a BTreeMap<String, ConfigValue>,
    /// Wired inputs keyed by declared port name.
    pub inputs: BTreeMap<&'static str, WiredInput>,
    /// Inputs wired into a feedback loop whose producer has not lowered
    /// yet. Only ever non-empty for released feedback blocks.
    pub deferred_ports: Vec<&'static str>,
    /// Resolver verdict; `None` for Transform blocks, which decide
    /// themselves via [`LowerCtx::bind_output_instance`].
    pub output_cardinality: Option<Cardinality>,
    /// Element context inferred from the field inputs.
    pub instance: Option<InstanceId>,
    pub ir: &'a mut IrBuilder,
    subst: &'a mut Substitution,
    sig: &'a SigInstance,
    expr_compiler: &'a dyn ExpressionCompiler,
    deferred_writes: Vec<(&'static str, StateId)>,
}

impl<'a> LowerCtx<'a> {
    pub fn input(&self, name: &str) -> Option<&WiredInput> {
        self.inputs.get(name)
    }

    pub fn wired(&self, name: &'static str) -> Result<&WiredInput, LowerFail> {
        self.inputs
            .get(name)
            .ok_or(LowerFail::MissingInput { port: name })
    }

    pub fn is_deferred(&self, name: &str) -> bool {
        self.deferred_ports.iter().any(|p| *p == name)
    }

    /// Finalized type of a declared output port.
    pub fn output_ty(&self, name: &str) -> Result<ConcreteType, LowerFail> {
        self.output_port(name)
            .ty
            .finalize(self.subst)
            .map_err(LowerFail::from)
    }

    /// Force an output port to be a field over `instance`. For blocks that
    /// create their own element domain.
    pub fn bind_output_instance(
        &mut self,
        name: &str,
        instance: InstanceId,
    ) -> Result<(), LowerFail> {
        let ty = self.output_port(name).ty.clone();
        match ty.extent.cardinality {
            AxisSlot::Var(v) => self.subst.assign_cardinality(v, Cardinality::Many)?,
            AxisSlot::Inst(Cardinality::Many) => {}
            AxisSlot::Inst(c) => {
                return Err(TypeConflict {
                    axis: AxisKind::Cardinality,
                    left: AxisValue::Cardinality(c),
                    right: AxisValue::Cardinality(Cardinality::Many),
                }
                .into())
            }
        }
        match ty.extent.binding {
            AxisSlot::Var(v) => self.subst.assign_binding(v, Binding::Bound(instance))?,
            AxisSlot::Inst(Binding::Bound(b)) if b == instance => {}
            AxisSlot::Inst(b) => {
                return Err(TypeConflict {
                    axis: AxisKind::Binding,
                    left: AxisValue::Binding(b),
                    right: AxisValue::Binding(Binding::Bound(instance)),
                }
                .into())
            }
        }
        Ok(())
    }

    /// Zip `op` across the children: a value kernel when the result is a
    /// signal, a per-element kernel when it is a field.
    pub fn kernel_auto(
        &mut self,
        op: KernelOp,
        children: &[ExprId],
        ty: ConcreteType,
    ) -> Result<ExprId, LowerFail> {
        if ty.extent.cardinality == Cardinality::One {
            let values: Vec<ValueExprId> = children
                .iter()
                .map(|c| match c {
                    ExprId::Value(v) => *v,
                    ExprId::Field(_) => unreachable!("signal kernel over a field child"),
                })
                .collect();
            Ok(ExprId::Value(self.ir.value_kernel(op, &values, ty)))
        } else {
            Ok(ExprId::Field(self.ir.kernel_zip(op, children, ty)?))
        }
    }

    /// Compile the embedded expression against the wired inputs, in
    /// declared port order.
    pub fn compile_expression(
        &mut self,
        text: &str,
        out_ty: &ConcreteType,
    ) -> Result<ExprId, LowerFail> {
        let bindings: Vec<ExprBinding> = self
            .sig
            .inputs
            .iter()
            .filter_map(|p| {
                self.inputs.get(p.name).map(|w| ExprBinding {
                    name: p.name,
                    expr: w.expr,
                    ty: w.ty.clone(),
                })
            })
            .collect();
        self.expr_compiler
            .compile_expression(text, &bindings, out_ty, self.ir)
            .map_err(LowerFail::from)
    }

    /// Record that `state` is written from input `port` once the loop's
    /// producer has lowered. For feedback blocks released inside a cycle.
    pub fn defer_state_write(&mut self, port: &'static str, state: StateId) {
        self.deferred_writes.push((port, state));
    }

    pub fn config_f64(&self, key: &str) -> Option<f64> {
        self.config.get(key).and_then(ConfigValue::as_f64)
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(ConfigValue::as_str)
    }

    pub fn config_f64_or(&self, key: &'static str, default: f64) -> Result<f64, LowerFail> {
        match self.config.get(key) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| LowerFail::BadConfig {
                key,
                message: "expected a number".to_string(),
            }),
        }
    }

    pub fn config_u32_or(&self, key: &'static str, default: u32) -> Result<u32, LowerFail> {
        match self.config.get(key) {
            None => Ok(default),
            Some(v) => match v.as_i64() {
                Some(n) if (0..=i64::from(u32::MAX)).contains(&n) => Ok(n as u32),
                _ => Err(LowerFail::BadConfig {
                    key,
                    message: "expected a non-negative integer".to_string(),
                }),
            },
        }
    }

    pub fn require_config_str(&self, key: &'static str) -> Result<&str, LowerFail> {
        self.config
            .get(key)
            .and_then(ConfigValue::as_str)
            .ok_or_else(|| LowerFail::BadConfig {
                key,
                message: "expected a string".to_string(),
            })
    }

    fn output_port(&self, name: &str) -> &PortType {
        self.sig
            .outputs
            .iter()
            .find(|p| p.name == name)
            .unwrap_or_else(|| {
                unreachable!("block '{}' declares no output '{name}'", self.block_name)
            })
    }
}

// ── Results ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDir {
    Input,
    Output,
}

/// Resolved type of one port after lowering; `None` when an axis stayed
/// open (its block carries a diagnostic).
#[derive(Debug, Clone)]
pub struct PortTypeEntry {
    pub block: BlockId,
    pub port: &'static str,
    pub dir: PortDir,
    pub ty: Option<ConcreteType>,
}

/// The lowered patch: the IR under construction plus per-port types.
#[derive(Debug)]
pub struct LoweredPatch {
    pub ir: IrBuilder,
    pub port_types: Vec<PortTypeEntry>,
    /// Element context each block lowered under (or created).
    pub block_instances: Vec<Option<InstanceId>>,
}

impl LoweredPatch {
    /// Human-readable per-port type listing, in declaration order.
    pub fn types_dump(&self, patch: &Patch) -> String {
        let mut out = String::new();
        for (idx, block) in patch.blocks.iter().enumerate() {
            let _ = writeln!(out, "block '{}' ({})", block.name, block.block_type);
            for e in self.port_types.iter().filter(|e| e.block.0 as usize == idx) {
                let dir = match e.dir {
                    PortDir::Input => "in ",
                    PortDir::Output => "out",
                };
                match &e.ty {
                    Some(ty) => {
                        let _ = writeln!(out, "  {dir} {}: {}", e.port, ty);
                    }
                    None => {
                        let _ = writeln!(out, "  {dir} {}: ?", e.port);
                    }
                }
            }
        }
        out
    }
}

/// Result of lowering and verification.
#[derive(Debug)]
pub struct LowerResult {
    pub lowered: LoweredPatch,
    pub unify_cert: UnifyCert,
    pub cert: LowerCert,
    pub diagnostics: Vec<Diagnostic>,
}

impl LowerResult {
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

/// Machine-checkable evidence for the lowering obligations.
#[derive(Debug, Clone)]
pub struct LowerCert {
    /// L1: every lowered block produced every declared output.
    pub l1_outputs_complete: bool,
    /// L2: every produced output matches its resolved port type.
    pub l2_ports_concrete: bool,
    /// L3: expression children precede their parents.
    pub l3_acyclic_tables: bool,
    /// L4: state writes are unique per state and reference live ids.
    pub l4_state_writes_sound: bool,
}

impl StageCert for LowerCert {
    fn all_pass(&self) -> bool {
        self.l1_outputs_complete
            && self.l2_ports_concrete
            && self.l3_acyclic_tables
            && self.l4_state_writes_sound
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("L1 declared outputs lowered", self.l1_outputs_complete),
            ("L2 concrete port types", self.l2_ports_concrete),
            ("L3 acyclic expression tables", self.l3_acyclic_tables),
            ("L4 sound state writes", self.l4_state_writes_sound),
        ]
    }
}

// ── Public entry point ───────────────────────────────────────────────────

/// Lower the patch: bind signatures, unify wires, visit blocks in
/// dependency order, then verify the L1-L4 obligations.
pub fn lower_and_verify(
    patch: &Patch,
    registry: &Registry,
    expr_compiler: &dyn ExpressionCompiler,
) -> LowerResult {
    debug!(
        blocks = patch.blocks.len(),
        wires = patch.wires.len(),
        "lowering patch"
    );
    let mut engine = LowerEngine::new(patch, registry, expr_compiler);
    engine.bind_signatures();
    engine.build_inbound();
    engine.unify_wires();
    engine.visit_in_dependency_order();
    engine.resolve_deferred_writes();
    engine.ir.set_current_block(None);

    let cert = engine.verify_obligations();
    let unify_cert = engine.subst.verify();
    let port_types = engine.collect_port_types();

    LowerResult {
        lowered: LoweredPatch {
            ir: engine.ir,
            port_types,
            block_instances: engine.block_instances,
        },
        unify_cert,
        cert,
        diagnostics: engine.diagnostics,
    }
}

// ── Lowering engine ──────────────────────────────────────────────────────

struct LowerEngine<'a> {
    patch: &'a Patch,
    registry: &'a Registry,
    expr_compiler: &'a dyn ExpressionCompiler,
    subst: Substitution,
    ir: IrBuilder,
    diagnostics: Vec<Diagnostic>,
    defs: Vec<Option<&'a BlockDef>>,
    sigs: Vec<Option<SigInstance>>,
    /// Output exprs per block; `None` until visited or after a failure.
    lowered: Vec<Option<BTreeMap<&'static str, ExprId>>>,
    block_instances: Vec<Option<InstanceId>>,
    visited: Vec<bool>,
    /// First wire into each input port; `None` marks a wire whose source
    /// block does not exist (validate reported it).
    inbound: HashMap<(BlockId, &'a str), Option<(BlockId, &'a str)>>,
    deferred_writes: Vec<(BlockId, &'static str, StateId)>,
}

impl<'a> LowerEngine<'a> {
    fn new(
        patch: &'a Patch,
        registry: &'a Registry,
        expr_compiler: &'a dyn ExpressionCompiler,
    ) -> Self {
        let n = patch.blocks.len();
        LowerEngine {
            patch,
            registry,
            expr_compiler,
            subst: Substitution::new(),
            ir: IrBuilder::new(),
            diagnostics: Vec::new(),
            defs: vec![None; n],
            sigs: vec![None; n],
            lowered: vec![None; n],
            block_instances: vec![None; n],
            visited: vec![false; n],
            inbound: HashMap::new(),
            deferred_writes: Vec::new(),
        }
    }

    // ── Phase 1: bind signatures ──────────────────────────────────────

    fn bind_signatures(&mut self) {
        let patch = self.patch;
        let registry = self.registry;
        for (idx, block) in patch.blocks.iter().enumerate() {
            match registry.lookup(&block.block_type) {
                Some(def) => {
                    self.sigs[idx] = Some(def.signature.instantiate(&mut self.subst));
                    self.defs[idx] = Some(def);
                }
                None => self.diagnostics.push(Diagnostic::error(
                    codes::UNKNOWN_BLOCK_TYPE,
                    Origin::Block(BlockId(idx as u32)),
                    format!("unknown block type '{}'", block.block_type),
                )),
            }
        }
    }

    fn build_inbound(&mut self) {
        let patch = self.patch;
        let names = patch.name_index();
        for wire in &patch.wires {
            let Some(&to) = names.get(wire.to.block.as_str()) else {
                continue;
            };
            let key = (to, wire.to.port.as_str());
            // First wire wins; duplicates carry an E0004 from validate.
            if self.inbound.contains_key(&key) {
                continue;
            }
            let src = names
                .get(wire.from.block.as_str())
                .map(|&f| (f, wire.from.port.as_str()));
            self.inbound.insert(key, src);
        }
    }

    // ── Phase 2: unify wire constraints ───────────────────────────────

    fn unify_wires(&mut self) {
        let patch = self.patch;
        let names = patch.name_index();
        for wire in &patch.wires {
            let (Some(&from), Some(&to)) = (
                names.get(wire.from.block.as_str()),
                names.get(wire.to.block.as_str()),
            ) else {
                continue;
            };
            let from_ty = self.sigs[from.0 as usize]
                .as_ref()
                .and_then(|s| s.outputs.iter().find(|p| p.name == wire.from.port))
                .map(|p| &p.ty);
            let to_ty = self.sigs[to.0 as usize]
                .as_ref()
                .and_then(|s| s.inputs.iter().find(|p| p.name == wire.to.port))
                .map(|p| &p.ty);
            let (Some(a), Some(b)) = (from_ty, to_ty) else {
                continue;
            };
            if let Err(conflict) = self.subst.unify(a, b) {
                self.diagnostics.push(Diagnostic::error(
                    codes::TYPE_CONFLICT,
                    Origin::Wire { from, to },
                    format!(
                        "incompatible types on {} -> {}: {}",
                        wire.from, wire.to, conflict
                    ),
                ));
            }
        }
    }

    // ── Phase 3: visit blocks in dependency order ─────────────────────

    fn visit_in_dependency_order(&mut self) {
        let n = self.patch.blocks.len();
        let mut indegree = vec![0usize; n];
        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut edges = HashSet::new();
        for (&(to, _), src) in &self.inbound {
            let Some((from, _)) = src else { continue };
            let (f, t) = (from.0 as usize, to.0 as usize);
            if edges.insert((f, t)) {
                consumers[f].push(t);
                indegree[t] += 1;
            }
        }
        for list in &mut consumers {
            list.sort_unstable();
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&b| indegree[b] == 0).collect();
        let mut remaining = n;
        while remaining > 0 {
            let (next, released) = match ready.iter().next().copied() {
                Some(b) => {
                    ready.remove(&b);
                    (b, false)
                }
                // Stalled: cut the loop at its first feedback block, whose
                // inputs read last frame's values anyway.
                None => match (0..n)
                    .find(|&b| !self.visited[b] && self.defs[b].map_or(false, |d| d.feedback))
                {
                    Some(b) => (b, true),
                    None => {
                        self.report_cycle();
                        return;
                    }
                },
            };
            self.visited[next] = true;
            remaining -= 1;
            self.visit_block(BlockId(next as u32), released);
            for &c in &consumers[next] {
                indegree[c] -= 1;
                if indegree[c] == 0 && !self.visited[c] {
                    ready.insert(c);
                }
            }
        }
    }

    fn report_cycle(&mut self) {
        let n = self.patch.blocks.len();
        let stuck: Vec<usize> = (0..n).filter(|&b| !self.visited[b]).collect();
        // A cycle through an unknown block type already got its report.
        if stuck.is_empty() || stuck.iter().any(|&b| self.sigs[b].is_none()) {
            return;
        }
        let mut producers: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (&(to, _), src) in &self.inbound {
            if let Some((from, _)) = src {
                producers[to.0 as usize].push(from.0 as usize);
            }
        }
        for list in &mut producers {
            list.sort_unstable();
        }
        // Walk producer links until a block repeats; the repeat closes the
        // loop and trims away blocks that are merely downstream of it.
        let mut trail: Vec<usize> = Vec::new();
        let mut cur = stuck[0];
        let mut cycle = loop {
            if let Some(pos) = trail.iter().position(|&b| b == cur) {
                break trail.split_off(pos);
            }
            trail.push(cur);
            cur = match producers[cur].iter().copied().find(|&f| !self.visited[f]) {
                Some(p) => p,
                None => break trail,
            };
        };
        cycle.sort_unstable();
        let names: Vec<String> = cycle
            .iter()
            .map(|&b| format!("'{}'", self.patch.blocks[b].name))
            .collect();
        self.diagnostics.push(
            Diagnostic::error(
                codes::UNSCHEDULABLE_CYCLE,
                Origin::Block(BlockId(cycle[0] as u32)),
                format!("blocks are wired into a cycle: {}", names.join(", ")),
            )
            .with_hint("route the loop through a delay block"),
        );
    }

    fn visit_block(&mut self, block: BlockId, released: bool) {
        let idx = block.0 as usize;
        let Some(def) = self.defs[idx] else { return };
        let patch = self.patch;
        let decl = patch.block(block);

        // Gather wired inputs whose producers already lowered.
        let mut inputs: BTreeMap<&'static str, WiredInput> = BTreeMap::new();
        let mut deferred_ports: Vec<&'static str> = Vec::new();
        let mut missing = false;
        {
            let Some(sig) = self.sigs[idx].as_ref() else {
                return;
            };
            for port in &sig.inputs {
                match self.inbound.get(&(block, port.name)) {
                    None => {
                        if port.required {
                            self.diagnostics.push(Diagnostic::error(
                                codes::MISSING_REQUIRED_INPUT,
                                Origin::port(block, port.name),
                                format!(
                                    "required input '{}' of '{}' is not wired",
                                    port.name, decl.name
                                ),
                            ));
                            missing = true;
                        }
                    }
                    Some(None) => {
                        // Wire from a nonexistent block; validate reported it.
                        missing = true;
                    }
                    Some(&Some((src, src_port))) => {
                        let produced = self.lowered[src.0 as usize]
                            .as_ref()
                            .and_then(|m| m.get(src_port).copied());
                        match produced {
                            Some(expr) => {
                                let ty = self.ir.expr(expr).ty.clone();
                                inputs.insert(port.name, WiredInput { expr, ty });
                            }
                            None if released && !self.visited[src.0 as usize] => {
                                deferred_ports.push(port.name);
                            }
                            None => {
                                // Producer failed or the port name is wrong;
                                // either way it is already on record.
                                missing = true;
                            }
                        }
                    }
                }
            }
        }
        if missing {
            return;
        }

        let has_broadcast = def
            .signature
            .broadcast_port
            .map_or(false, |p| inputs.contains_key(p));

        // Output cardinality by mode and policy.
        let cards: Vec<Cardinality> = inputs.values().map(|w| w.ty.extent.cardinality).collect();
        let resolved = match resolve_output_cardinality(
            def.cardinality_mode,
            def.broadcast_policy,
            def.signature.broadcast_port,
            has_broadcast,
            &cards,
        ) {
            Ok(c) => c,
            Err(err) => {
                let diag = match &err {
                    CardinalityError::Mismatch { .. } => {
                        let mut d = Diagnostic::error(
                            codes::CARDINALITY_MISMATCH,
                            Origin::Block(block),
                            format!("'{}': {}", decl.name, err),
                        )
                        .with_hint("reduce the field first, or zip through a lane-local block");
                        for (port, w) in &inputs {
                            let what = match w.ty.extent.cardinality {
                                Cardinality::One => "a signal",
                                Cardinality::Many => "a field",
                            };
                            d = d.with_cause(
                                format!("input '{port}' is {what}"),
                                Some(Origin::port(block, *port)),
                            );
                        }
                        d
                    }
                    CardinalityError::BroadcastExprRequired { broadcast_port } => {
                        Diagnostic::error(
                            codes::BROADCAST_EXPR_REQUIRED,
                            Origin::Block(block),
                            format!("'{}': {}", decl.name, err),
                        )
                        .with_hint(format!("wire the '{}' input", broadcast_port))
                    }
                };
                self.diagnostics.push(diag);
                return;
            }
        };

        // Element context from the field inputs.
        let mut instance: Option<InstanceId> = None;
        for w in inputs.values() {
            let Binding::Bound(i) = w.ty.extent.binding else {
                continue;
            };
            match instance {
                None => instance = Some(i),
                Some(j) if j != i => {
                    self.diagnostics.push(Diagnostic::error(
                        codes::DOMAIN_MISMATCH,
                        Origin::Block(block),
                        format!(
                            "'{}' mixes inputs from different element domains (inst{} vs inst{})",
                            decl.name, j.0, i.0
                        ),
                    ));
                    return;
                }
                Some(_) => {}
            }
        }

        let varying = inputs
            .values()
            .any(|w| w.ty.extent.temporality == Temporality::Varying);
        let transform = def.cardinality_mode == CardinalityMode::Transform;
        if !self.assign_output_extents(block, idx, transform, resolved, instance, varying) {
            return;
        }

        self.ir.set_current_block(Some(block));
        let Some(sig) = self.sigs[idx].as_ref() else {
            return;
        };
        let mut ctx = LowerCtx {
            block,
            block_name: &decl.name,
            config: &decl.config,
            inputs,
            deferred_ports,
            output_cardinality: resolved,
            instance,
            ir: &mut self.ir,
            subst: &mut self.subst,
            sig,
            expr_compiler: self.expr_compiler,
            deferred_writes: Vec::new(),
        };
        let outcome = (def.lower)(&mut ctx);
        let local_deferred = ctx.deferred_writes;

        match outcome {
            Ok(out) => {
                self.block_instances[idx] = out.instance.or(instance);
                for (port, state) in local_deferred {
                    self.deferred_writes.push((block, port, state));
                }
                self.lowered[idx] = Some(out.outputs);
            }
            Err(fail) => self.report_lower_fail(block, &decl.name, fail),
        }
    }

    /// Pin the output extents the resolver decided, then close whatever
    /// axes global unification left open over neutral defaults. Returns
    /// false when an assignment clashed with a wiring constraint.
    fn assign_output_extents(
        &mut self,
        block: BlockId,
        idx: usize,
        transform: bool,
        resolved: Option<Cardinality>,
        instance: Option<InstanceId>,
        varying: bool,
    ) -> bool {
        let Some(sig) = self.sigs[idx].as_ref() else {
            return true;
        };
        let computed_temp = if varying {
            Temporality::Varying
        } else {
            Temporality::Static
        };
        'ports: for port in &sig.outputs {
            let ty = &port.ty;
            if !transform {
                let card = match resolved {
                    Some(c) => c,
                    None => unreachable!("non-transform modes always resolve a cardinality"),
                };
                let clash = match ty.extent.cardinality {
                    AxisSlot::Var(v) => self.subst.assign_cardinality(v, card).err(),
                    AxisSlot::Inst(c) if c == card => None,
                    AxisSlot::Inst(c) => Some(TypeConflict {
                        axis: AxisKind::Cardinality,
                        left: AxisValue::Cardinality(c),
                        right: AxisValue::Cardinality(card),
                    }),
                };
                if let Some(conflict) = clash {
                    self.diagnostics.push(Diagnostic::error(
                        codes::TYPE_CONFLICT,
                        Origin::port(block, port.name),
                        format!("output '{}': {}", port.name, conflict),
                    ));
                    return false;
                }
                let want_binding = match (card, instance) {
                    (Cardinality::Many, Some(inst)) => Some(Binding::Bound(inst)),
                    // No context yet: the block's lowering binds or fails.
                    (Cardinality::Many, None) => None,
                    (Cardinality::One, _) => Some(Binding::Free),
                };
                if let Some(binding) = want_binding {
                    let clash = match ty.extent.binding {
                        AxisSlot::Var(v) => self.subst.assign_binding(v, binding).err(),
                        AxisSlot::Inst(b) if b == binding => None,
                        AxisSlot::Inst(b) => Some(TypeConflict {
                            axis: AxisKind::Binding,
                            left: AxisValue::Binding(b),
                            right: AxisValue::Binding(binding),
                        }),
                    };
                    if let Some(conflict) = clash {
                        self.diagnostics.push(Diagnostic::error(
                            codes::TYPE_CONFLICT,
                            Origin::port(block, port.name),
                            format!("output '{}': {}", port.name, conflict),
                        ));
                        continue 'ports;
                    }
                }
            }
            if let AxisSlot::Var(v) = ty.extent.temporality {
                if self.subst.temporality(v).is_none()
                    && self.subst.assign_temporality(v, computed_temp).is_err()
                {
                    unreachable!("rebound a resolved temporality group");
                }
            }
            if let AxisSlot::Var(v) = ty.unit {
                if self.subst.unit(v).is_none()
                    && self.subst.assign_unit(v, Unit::Dimensionless).is_err()
                {
                    unreachable!("rebound a resolved unit group");
                }
            }
            if let AxisSlot::Var(v) = ty.extent.perspective {
                if self.subst.perspective(v).is_none()
                    && self
                        .subst
                        .assign_perspective(v, Perspective::Local)
                        .is_err()
                {
                    unreachable!("rebound a resolved perspective group");
                }
            }
            if let AxisSlot::Var(v) = ty.extent.branch {
                if self.subst.branch(v).is_none()
                    && self.subst.assign_branch(v, Branch::Main).is_err()
                {
                    unreachable!("rebound a resolved branch group");
                }
            }
        }
        true
    }

    fn report_lower_fail(&mut self, block: BlockId, name: &str, fail: LowerFail) {
        let diag = match fail {
            LowerFail::Ir(err @ IrError::InstanceContextMissing) => Diagnostic::error(
                codes::INSTANCE_CONTEXT_MISSING,
                Origin::Block(block),
                format!("'{name}': {err}"),
            )
            .with_hint("wire a field input or place the block after a spawn"),
            LowerFail::Ir(err @ IrError::DomainMismatch { .. }) => Diagnostic::error(
                codes::DOMAIN_MISMATCH,
                Origin::Block(block),
                format!("'{name}': {err}"),
            ),
            LowerFail::BadConfig { key, message } => Diagnostic::error(
                codes::BAD_BLOCK_CONFIG,
                Origin::Block(block),
                format!("'{name}' config '{key}': {message}"),
            ),
            LowerFail::Expr(err) => {
                let message = match err.position {
                    Some(pos) => {
                        format!("'{name}' expression error at offset {pos}: {}", err.message)
                    }
                    None => format!("'{name}' expression error: {}", err.message),
                };
                let mut diag =
                    Diagnostic::error(codes::EXPR_COMPILE_FAILED, Origin::Block(block), message);
                if let Some(suggestion) = err.suggestion {
                    diag = diag.with_hint(suggestion);
                }
                diag
            }
            LowerFail::Unresolved(err) => Diagnostic::error(
                codes::UNRESOLVED_AXIS_VAR,
                Origin::Block(block),
                format!("cannot finalize '{name}': {err}"),
            )
            .with_hint("wire a producer that pins the open axis"),
            LowerFail::Conflict(conflict) => Diagnostic::error(
                codes::TYPE_CONFLICT,
                Origin::Block(block),
                format!("'{name}': {conflict}"),
            ),
            LowerFail::MissingInput { port } => Diagnostic::error(
                codes::MISSING_REQUIRED_INPUT,
                Origin::port(block, port),
                format!("required input '{port}' of '{name}' is not wired"),
            ),
        };
        self.diagnostics.push(diag);
    }

    // ── Phase 4: feedback state writes ────────────────────────────────

    fn resolve_deferred_writes(&mut self) {
        let writes = std::mem::take(&mut self.deferred_writes);
        for (block, port, state) in writes {
            let Some(Some((src, src_port))) = self.inbound.get(&(block, port)).copied() else {
                continue;
            };
            let Some(expr) = self.lowered[src.0 as usize]
                .as_ref()
                .and_then(|m| m.get(src_port).copied())
            else {
                // The loop's producer failed; its diagnostic stands.
                continue;
            };
            self.ir.note_state_write(state, expr);
        }
    }

    fn collect_port_types(&self) -> Vec<PortTypeEntry> {
        let mut out = Vec::new();
        for (idx, sig) in self.sigs.iter().enumerate() {
            let Some(sig) = sig else { continue };
            let block = BlockId(idx as u32);
            for p in &sig.inputs {
                out.push(PortTypeEntry {
                    block,
                    port: p.name,
                    dir: PortDir::Input,
                    ty: p.ty.finalize(&self.subst).ok(),
                });
            }
            for p in &sig.outputs {
                out.push(PortTypeEntry {
                    block,
                    port: p.name,
                    dir: PortDir::Output,
                    ty: p.ty.finalize(&self.subst).ok(),
                });
            }
        }
        out
    }

    // ── Phase 5: L1-L4 verification ───────────────────────────────────

    fn verify_obligations(&mut self) -> LowerCert {
        let l1 = self.verify_l1_outputs_complete();
        let l2 = self.verify_l2_ports_concrete();
        let l3 = self.verify_l3_acyclic_tables();
        let l4 = self.verify_l4_state_writes();
        LowerCert {
            l1_outputs_complete: l1,
            l2_ports_concrete: l2,
            l3_acyclic_tables: l3,
            l4_state_writes_sound: l4,
        }
    }

    fn verify_l1_outputs_complete(&mut self) -> bool {
        let patch = self.patch;
        let mut ok = true;
        for idx in 0..patch.blocks.len() {
            let (Some(sig), Some(produced)) = (self.sigs[idx].as_ref(), self.lowered[idx].as_ref())
            else {
                continue;
            };
            for port in &sig.outputs {
                if !produced.contains_key(port.name) {
                    self.diagnostics.push(Diagnostic::error(
                        codes::LOWER_CERT_FAILED,
                        Origin::port(BlockId(idx as u32), port.name),
                        format!(
                            "lowering verification failed (L1 outputs complete): \
                             block '{}' produced no expression for output '{}'",
                            patch.blocks[idx].name, port.name
                        ),
                    ));
                    ok = false;
                }
            }
        }
        ok
    }

    fn verify_l2_ports_concrete(&mut self) -> bool {
        let patch = self.patch;
        let mut ok = true;
        for idx in 0..patch.blocks.len() {
            let (Some(sig), Some(produced)) = (self.sigs[idx].as_ref(), self.lowered[idx].as_ref())
            else {
                continue;
            };
            for port in &sig.outputs {
                let Some(&expr) = produced.get(port.name) else {
                    continue;
                };
                let resolved = match port.ty.finalize(&self.subst) {
                    Ok(ty) => ty,
                    Err(unresolved) => {
                        self.diagnostics.push(Diagnostic::error(
                            codes::LOWER_CERT_FAILED,
                            Origin::port(BlockId(idx as u32), port.name),
                            format!(
                                "lowering verification failed (L2 concrete ports): \
                                 output '{}' of '{}' never resolved: {}",
                                port.name, patch.blocks[idx].name, unresolved
                            ),
                        ));
                        ok = false;
                        continue;
                    }
                };
                let actual = self.ir.expr(expr).ty.clone();
                if actual != resolved {
                    self.diagnostics.push(Diagnostic::error(
                        codes::LOWER_CERT_FAILED,
                        Origin::port(BlockId(idx as u32), port.name),
                        format!(
                            "lowering verification failed (L2 concrete ports): \
                             output '{}' of '{}' lowered as {} but resolved to {}",
                            port.name, patch.blocks[idx].name, actual, resolved
                        ),
                    ));
                    ok = false;
                }
            }
        }
        ok
    }

    fn verify_l3_acyclic_tables(&mut self) -> bool {
        let mut ok = true;
        let value_count = self.ir.value_count();
        let field_count = self.ir.field_count();
        let mut violations: Vec<(ExprId, ExprId)> = Vec::new();
        for i in 0..value_count {
            let id = ValueExprId(i as u32);
            for child in self.ir.value_expr(id).kind.children() {
                let fine = match child {
                    ExprId::Value(v) => (v.0 as usize) < i,
                    ExprId::Field(f) => (f.0 as usize) < field_count,
                };
                if !fine {
                    violations.push((ExprId::Value(id), child));
                }
            }
        }
        for i in 0..field_count {
            let id = FieldExprId(i as u32);
            for child in self.ir.field_expr(id).kind.children() {
                let fine = match child {
                    ExprId::Field(f) => (f.0 as usize) < i,
                    ExprId::Value(v) => (v.0 as usize) < value_count,
                };
                if !fine {
                    violations.push((ExprId::Field(id), child));
                }
            }
        }
        for (parent, child) in violations {
            let origin = match self.ir.origin_of(parent) {
                Some(block) => Origin::Block(block),
                None => Origin::Patch,
            };
            self.diagnostics.push(Diagnostic::error(
                codes::LOWER_CERT_FAILED,
                origin,
                format!(
                    "lowering verification failed (L3 acyclic tables): \
                     {parent} references {child} out of order"
                ),
            ));
            ok = false;
        }
        ok
    }

    fn verify_l4_state_writes(&mut self) -> bool {
        let mut ok = true;
        let state_count = self.ir.states().len();
        let value_count = self.ir.value_count();
        let field_count = self.ir.field_count();
        let mut seen = HashSet::new();
        let mut violations: Vec<String> = Vec::new();
        for write in self.ir.state_writes() {
            if (write.state.0 as usize) >= state_count {
                violations.push(format!("write targets unknown state st{}", write.state.0));
                continue;
            }
            let src_ok = match write.src {
                ExprId::Value(v) => (v.0 as usize) < value_count,
                ExprId::Field(f) => (f.0 as usize) < field_count,
            };
            if !src_ok {
                violations.push(format!(
                    "write into st{} reads unknown expression {}",
                    write.state.0, write.src
                ));
            }
            if !seen.insert(write.state) {
                violations.push(format!(
                    "state st{} written twice in one frame",
                    write.state.0
                ));
            }
        }
        for message in violations {
            self.diagnostics.push(Diagnostic::error(
                codes::LOWER_CERT_FAILED,
                Origin::Patch,
                format!("lowering verification failed (L4 sound state writes): {message}"),
            ));
            ok = false;
        }
        ok
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
