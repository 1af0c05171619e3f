// ir.rs — Frame IR: interned expression tables plus instance/state/slot
// declarations
//
// Two append-only tables hold the per-frame dataflow: value expressions
// (one result per frame) and field expressions (one result per element).
// Construction is structurally memoized on (kind, children, type), so a
// subexpression built twice is the same id and is evaluated once.
//
// Preconditions: expression types are fully concrete; callers resolve
//   axes before building.
// Postconditions: ids are dense indices in creation order and never move.
// Failure modes: `IrError` from domain-sensitive constructors.
// Side effects: none outside the builder.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use thiserror::Error;

use crate::canon::{Binding, Cardinality, ConcreteType};
use crate::id::{
    BlockId, ExprId, FieldExprId, IdAllocator, InstanceId, SlotId, StateId, ValueExprId,
};
use crate::value::Value;

// ── Kernels ──────────────────────────────────────────────────────────────

/// A pure lanewise operation. Identity is the name: two ops with the same
/// name must have the same eval function.
#[derive(Clone, Copy)]
pub struct KernelOp {
    pub name: &'static str,
    pub eval: fn(&[Value]) -> Value,
}

impl PartialEq for KernelOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for KernelOp {}

impl Hash for KernelOp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for KernelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelOp")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The standard kernel set used by the built-in block library.
pub mod kernels {
    use std::f64::consts::TAU;

    use super::KernelOp;
    use crate::value::Value;

    fn add(vals: &[Value]) -> Value {
        vals[0].zip(vals[1], |a, b| a + b)
    }

    fn sub(vals: &[Value]) -> Value {
        vals[0].zip(vals[1], |a, b| a - b)
    }

    fn mul(vals: &[Value]) -> Value {
        vals[0].zip(vals[1], |a, b| a * b)
    }

    // Division by zero yields zero: per-frame output must never be NaN.
    fn div(vals: &[Value]) -> Value {
        vals[0].zip(vals[1], |a, b| if b == 0.0 { 0.0 } else { a / b })
    }

    fn min(vals: &[Value]) -> Value {
        vals[0].zip(vals[1], f64::min)
    }

    fn max(vals: &[Value]) -> Value {
        vals[0].zip(vals[1], f64::max)
    }

    /// mix(a, b, t) = a + (b - a)·t, t broadcast lanewise.
    fn mix(vals: &[Value]) -> Value {
        let delta = vals[0].zip(vals[1], |a, b| b - a);
        let scaled = delta.zip(vals[2], |d, t| d * t);
        vals[0].zip(scaled, |a, d| a + d)
    }

    /// select(which, a, b): a when which < 0.5, else b. Whole-value pick,
    /// not per component.
    fn select(vals: &[Value]) -> Value {
        let which = vals[0].component(0).unwrap_or(0.0);
        if which < 0.5 {
            vals[1]
        } else {
            vals[2]
        }
    }

    /// sine_osc(t_ms, freq_hz, phase) = sin(2π·(t·f + phase)), t in seconds.
    fn sine_osc(vals: &[Value]) -> Value {
        let cycles = vals[0].zip(vals[1], |t, f| t / 1000.0 * f);
        let shifted = cycles.zip(vals[2], |c, p| c + p);
        shifted.map(|x| (TAU * x).sin())
    }

    pub const ADD: KernelOp = KernelOp { name: "add", eval: add };
    pub const SUB: KernelOp = KernelOp { name: "sub", eval: sub };
    pub const MUL: KernelOp = KernelOp { name: "mul", eval: mul };
    pub const DIV: KernelOp = KernelOp { name: "div", eval: div };
    pub const MIN: KernelOp = KernelOp { name: "min", eval: min };
    pub const MAX: KernelOp = KernelOp { name: "max", eval: max };
    pub const MIX: KernelOp = KernelOp { name: "mix", eval: mix };
    pub const SELECT: KernelOp = KernelOp { name: "select", eval: select };
    pub const SINE_OSC: KernelOp = KernelOp { name: "sine_osc", eval: sine_osc };
}

// ── Expression kinds ─────────────────────────────────────────────────────

/// Per-element channel a domain instance provides to its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicChannel {
    /// Element index, 0-based, as a float.
    Index,
    /// Index scaled into [0, 1]; a single element reads 0.
    NormalizedIndex,
    /// Per-element stable random in [0, 1), keyed by the element's
    /// identity so it survives count changes.
    RandomId,
}

impl fmt::Display for IntrinsicChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntrinsicChannel::Index => "index",
            IntrinsicChannel::NormalizedIndex => "normalizedIndex",
            IntrinsicChannel::RandomId => "randomId",
        };
        write!(f, "{}", s)
    }
}

/// Neighborhood derivative over a field treated as a closed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathDerivKind {
    /// Central difference (p[i+1] − p[i−1]) / 2 with cyclic indexing.
    Tangent,
    /// Cumulative Euclidean length from element 0, not wrapped.
    ArcLength,
}

impl fmt::Display for PathDerivKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PathDerivKind::Tangent => "tangent",
            PathDerivKind::ArcLength => "arcLength",
        };
        write!(f, "{}", s)
    }
}

/// One node of the frame dataflow. Children referencing the value table
/// are broadcast when the parent lives in the field table.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Const(Value),
    /// Current frame time in milliseconds.
    Time,
    /// Host-provided named input, defaulting to zero when absent.
    External { name: String },
    Kernel { op: KernelOp, children: Vec<ExprId> },
    /// Lanewise reduction of a field to a single value.
    Fold { op: KernelOp, child: FieldExprId },
    Intrinsic {
        instance: InstanceId,
        channel: IntrinsicChannel,
    },
    Extract { child: ExprId, component: u8 },
    Construct { children: Vec<ExprId> },
    /// Previous-frame read of persistent storage.
    StateRead { state: StateId },
    PathDerivative {
        kind: PathDerivKind,
        child: FieldExprId,
    },
}

impl ExprKind {
    /// Direct operands, in evaluation order.
    pub fn children(&self) -> Vec<ExprId> {
        match self {
            ExprKind::Const(_)
            | ExprKind::Time
            | ExprKind::External { .. }
            | ExprKind::Intrinsic { .. }
            | ExprKind::StateRead { .. } => Vec::new(),
            ExprKind::Kernel { children, .. } | ExprKind::Construct { children } => {
                children.clone()
            }
            ExprKind::Fold { child, .. } | ExprKind::PathDerivative { child, .. } => {
                vec![ExprId::Field(*child)]
            }
            ExprKind::Extract { child, .. } => vec![*child],
        }
    }
}

/// An interned expression: its shape plus its fully concrete type.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: ConcreteType,
}

// ── Errors ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("per-element operation used outside any element context")]
    InstanceContextMissing,
    #[error("field operands belong to different domains (inst{} vs inst{})", left.0, right.0)]
    DomainMismatch { left: InstanceId, right: InstanceId },
}

// ── Declarations ─────────────────────────────────────────────────────────

/// A per-frame storage cell. `stride` is lanes per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDecl {
    pub stride: u32,
}

/// A spawned element domain.
#[derive(Debug, Clone)]
pub struct InstanceDecl {
    pub origin: BlockId,
    pub default_count: u32,
    pub label: String,
}

/// Persistent storage surviving across frames. `instance: None` is a
/// single cell; `Some` keeps one cell per element.
#[derive(Debug, Clone, Copy)]
pub struct StateDecl {
    pub stride: u32,
    pub instance: Option<InstanceId>,
    pub init: f64,
}

/// Deferred write into persistent storage, applied at end of frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateWrite {
    pub state: StateId,
    pub src: ExprId,
}

/// A named program output.
#[derive(Debug, Clone)]
pub struct ExportDecl {
    pub name: String,
    pub expr: ExprId,
    pub block: BlockId,
}

// ── Memoization key ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MemoKey {
    Const(u8, [u64; 4]),
    Time,
    External(String),
    Kernel(&'static str, Vec<ExprId>),
    Fold(&'static str, FieldExprId),
    Intrinsic(InstanceId, IntrinsicChannel),
    Extract(ExprId, u8),
    Construct(Vec<ExprId>),
    StateRead(StateId),
    PathDerivative(PathDerivKind, FieldExprId),
}

fn memo_key(kind: &ExprKind) -> MemoKey {
    match kind {
        ExprKind::Const(v) => {
            let mut lanes = [0f64; 4];
            v.write_lanes(&mut lanes[..v.width()]);
            let mut bits = [0u64; 4];
            for (b, l) in bits.iter_mut().zip(&lanes) {
                *b = l.to_bits();
            }
            MemoKey::Const(v.width() as u8, bits)
        }
        ExprKind::Time => MemoKey::Time,
        ExprKind::External { name } => MemoKey::External(name.clone()),
        ExprKind::Kernel { op, children } => MemoKey::Kernel(op.name, children.clone()),
        ExprKind::Fold { op, child } => MemoKey::Fold(op.name, *child),
        ExprKind::Intrinsic { instance, channel } => MemoKey::Intrinsic(*instance, *channel),
        ExprKind::Extract { child, component } => MemoKey::Extract(*child, *component),
        ExprKind::Construct { children } => MemoKey::Construct(children.clone()),
        ExprKind::StateRead { state } => MemoKey::StateRead(*state),
        ExprKind::PathDerivative { kind, child } => MemoKey::PathDerivative(*kind, *child),
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Accumulates the frame IR during lowering. All tables are append-only.
#[derive(Debug, Default)]
pub struct IrBuilder {
    value_exprs: Vec<Expr>,
    field_exprs: Vec<Expr>,
    value_origin: Vec<Option<BlockId>>,
    field_origin: Vec<Option<BlockId>>,
    memo: HashMap<(MemoKey, ConcreteType), ExprId>,
    slots: Vec<SlotDecl>,
    instances: Vec<InstanceDecl>,
    states: Vec<StateDecl>,
    state_writes: Vec<StateWrite>,
    exports: Vec<ExportDecl>,
    id_alloc: IdAllocator,
    current_block: Option<BlockId>,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag subsequently built expressions with their originating block.
    pub fn set_current_block(&mut self, block: Option<BlockId>) {
        self.current_block = block;
    }

    fn intern_value(&mut self, kind: ExprKind, ty: ConcreteType) -> ValueExprId {
        let key = (memo_key(&kind), ty.clone());
        if let Some(found) = self.memo.get(&key) {
            match found {
                ExprId::Value(id) => return *id,
                ExprId::Field(_) => unreachable!("memo key crossed tables"),
            }
        }
        let id = ValueExprId(self.value_exprs.len() as u32);
        self.value_exprs.push(Expr { kind, ty });
        self.value_origin.push(self.current_block);
        self.memo.insert(key, ExprId::Value(id));
        id
    }

    fn intern_field(&mut self, kind: ExprKind, ty: ConcreteType) -> FieldExprId {
        let key = (memo_key(&kind), ty.clone());
        if let Some(found) = self.memo.get(&key) {
            match found {
                ExprId::Field(id) => return *id,
                ExprId::Value(_) => unreachable!("memo key crossed tables"),
            }
        }
        let id = FieldExprId(self.field_exprs.len() as u32);
        self.field_exprs.push(Expr { kind, ty });
        self.field_origin.push(self.current_block);
        self.memo.insert(key, ExprId::Field(id));
        id
    }

    // ── Slots ──

    /// Reserve a storage cell of `stride` lanes per element. Ids are
    /// dense and strictly increasing.
    pub fn alloc_slot(&mut self, stride: u32) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(SlotDecl { stride });
        id
    }

    // ── Value expressions ──

    pub fn value_const(&mut self, v: Value, ty: ConcreteType) -> ValueExprId {
        self.intern_value(ExprKind::Const(v), ty)
    }

    pub fn value_time(&mut self, ty: ConcreteType) -> ValueExprId {
        self.intern_value(ExprKind::Time, ty)
    }

    pub fn value_external(&mut self, name: &str, ty: ConcreteType) -> ValueExprId {
        self.intern_value(
            ExprKind::External {
                name: name.to_string(),
            },
            ty,
        )
    }

    pub fn value_kernel(
        &mut self,
        op: KernelOp,
        children: &[ValueExprId],
        ty: ConcreteType,
    ) -> ValueExprId {
        let children = children.iter().copied().map(ExprId::Value).collect();
        self.intern_value(ExprKind::Kernel { op, children }, ty)
    }

    /// Reduce a field to a single value by folding `op` across lanes.
    pub fn fold(&mut self, op: KernelOp, child: FieldExprId, ty: ConcreteType) -> ValueExprId {
        self.intern_value(ExprKind::Fold { op, child }, ty)
    }

    // ── Field expressions ──

    /// Per-element channel of a known instance.
    pub fn field_source(
        &mut self,
        instance: InstanceId,
        channel: IntrinsicChannel,
        ty: ConcreteType,
    ) -> FieldExprId {
        self.intern_field(ExprKind::Intrinsic { instance, channel }, ty)
    }

    /// Per-element channel where the instance comes from surrounding
    /// context; refuses when no context is in scope.
    pub fn field_intrinsic(
        &mut self,
        instance: Option<InstanceId>,
        channel: IntrinsicChannel,
        ty: ConcreteType,
    ) -> Result<FieldExprId, IrError> {
        let instance = instance.ok_or(IrError::InstanceContextMissing)?;
        Ok(self.field_source(instance, channel, ty))
    }

    /// Lanewise kernel over mixed children: field children must share one
    /// domain; value children are broadcast to every lane.
    pub fn kernel_zip(
        &mut self,
        op: KernelOp,
        children: &[ExprId],
        ty: ConcreteType,
    ) -> Result<FieldExprId, IrError> {
        self.check_one_domain(children)?;
        Ok(self.intern_field(
            ExprKind::Kernel {
                op,
                children: children.to_vec(),
            },
            ty,
        ))
    }

    pub fn path_derivative(
        &mut self,
        kind: PathDerivKind,
        child: FieldExprId,
        ty: ConcreteType,
    ) -> FieldExprId {
        self.intern_field(ExprKind::PathDerivative { kind, child }, ty)
    }

    // ── Table-agnostic constructors ──

    /// Component extraction; lands in the same table as its child.
    pub fn extract(&mut self, child: ExprId, component: u8, ty: ConcreteType) -> ExprId {
        let kind = ExprKind::Extract { child, component };
        match child {
            ExprId::Value(_) => ExprId::Value(self.intern_value(kind, ty)),
            ExprId::Field(_) => ExprId::Field(self.intern_field(kind, ty)),
        }
    }

    /// Vector construction from scalar children. Any field child makes the
    /// result a field; all field children must share one domain.
    pub fn construct(&mut self, children: &[ExprId], ty: ConcreteType) -> Result<ExprId, IrError> {
        let kind = ExprKind::Construct {
            children: children.to_vec(),
        };
        if children.iter().any(|c| matches!(c, ExprId::Field(_))) {
            self.check_one_domain(children)?;
            Ok(ExprId::Field(self.intern_field(kind, ty)))
        } else {
            Ok(ExprId::Value(self.intern_value(kind, ty)))
        }
    }

    /// Previous-frame read; the expression's table follows the state's
    /// domain.
    pub fn state_read(&mut self, state: StateId, ty: ConcreteType) -> ExprId {
        let kind = ExprKind::StateRead { state };
        match self.states[state.0 as usize].instance {
            Some(_) => ExprId::Field(self.intern_field(kind, ty)),
            None => ExprId::Value(self.intern_value(kind, ty)),
        }
    }

    // ── Instances, states, exports ──

    pub fn alloc_instance(
        &mut self,
        origin: BlockId,
        default_count: u32,
        label: &str,
    ) -> InstanceId {
        let id = self.id_alloc.alloc_instance();
        self.instances.push(InstanceDecl {
            origin,
            default_count,
            label: label.to_string(),
        });
        id
    }

    pub fn alloc_state(&mut self, stride: u32, instance: Option<InstanceId>, init: f64) -> StateId {
        let id = self.id_alloc.alloc_state();
        self.states.push(StateDecl {
            stride,
            instance,
            init,
        });
        id
    }

    /// Record an end-of-frame write. Reads elsewhere in the same frame
    /// still observe the previous value.
    pub fn note_state_write(&mut self, state: StateId, src: ExprId) {
        self.state_writes.push(StateWrite { state, src });
    }

    pub fn export(&mut self, name: &str, expr: ExprId, block: BlockId) {
        self.exports.push(ExportDecl {
            name: name.to_string(),
            expr,
            block,
        });
    }

    // ── Access ──

    pub fn value_expr(&self, id: ValueExprId) -> &Expr {
        &self.value_exprs[id.0 as usize]
    }

    pub fn field_expr(&self, id: FieldExprId) -> &Expr {
        &self.field_exprs[id.0 as usize]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        match id {
            ExprId::Value(v) => self.value_expr(v),
            ExprId::Field(fe) => self.field_expr(fe),
        }
    }

    /// The domain an expression's lanes belong to, if it is a field.
    pub fn instance_of(&self, id: ExprId) -> Option<InstanceId> {
        let ty = &self.expr(id).ty;
        match (ty.extent.cardinality, ty.extent.binding) {
            (Cardinality::Many, Binding::Bound(i)) => Some(i),
            _ => None,
        }
    }

    fn check_one_domain(&self, children: &[ExprId]) -> Result<Option<InstanceId>, IrError> {
        let mut domain: Option<InstanceId> = None;
        for child in children {
            if let Some(inst) = self.instance_of(*child) {
                match domain {
                    None => domain = Some(inst),
                    Some(d) if d != inst => {
                        return Err(IrError::DomainMismatch {
                            left: d,
                            right: inst,
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(domain)
    }

    pub fn value_count(&self) -> usize {
        self.value_exprs.len()
    }

    pub fn field_count(&self) -> usize {
        self.field_exprs.len()
    }

    pub fn slots(&self) -> &[SlotDecl] {
        &self.slots
    }

    pub fn instances(&self) -> &[InstanceDecl] {
        &self.instances
    }

    pub fn instance(&self, id: InstanceId) -> &InstanceDecl {
        &self.instances[id.0 as usize]
    }

    pub fn states(&self) -> &[StateDecl] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> &StateDecl {
        &self.states[id.0 as usize]
    }

    pub fn state_writes(&self) -> &[StateWrite] {
        &self.state_writes
    }

    pub fn exports(&self) -> &[ExportDecl] {
        &self.exports
    }

    pub fn origin_of(&self, id: ExprId) -> Option<BlockId> {
        match id {
            ExprId::Value(v) => self.value_origin[v.0 as usize],
            ExprId::Field(fe) => self.field_origin[fe.0 as usize],
        }
    }

    /// Consume the builder into its raw tables, for program assembly.
    pub fn into_tables(self) -> IrTables {
        IrTables {
            value_exprs: self.value_exprs,
            field_exprs: self.field_exprs,
            value_origin: self.value_origin,
            field_origin: self.field_origin,
            slots: self.slots,
            instances: self.instances,
            states: self.states,
            state_writes: self.state_writes,
            exports: self.exports,
        }
    }
}

/// The builder's tables after lowering, ready for scheduling.
#[derive(Debug, Default)]
pub struct IrTables {
    pub value_exprs: Vec<Expr>,
    pub field_exprs: Vec<Expr>,
    pub value_origin: Vec<Option<BlockId>>,
    pub field_origin: Vec<Option<BlockId>>,
    pub slots: Vec<SlotDecl>,
    pub instances: Vec<InstanceDecl>,
    pub states: Vec<StateDecl>,
    pub state_writes: Vec<StateWrite>,
    pub exports: Vec<ExportDecl>,
}

impl IrTables {
    pub fn expr(&self, id: ExprId) -> &Expr {
        match id {
            ExprId::Value(v) => &self.value_exprs[v.0 as usize],
            ExprId::Field(fe) => &self.field_exprs[fe.0 as usize],
        }
    }
}

// ── Dump ─────────────────────────────────────────────────────────────────

fn write_kind(f: &mut fmt::Formatter<'_>, kind: &ExprKind) -> fmt::Result {
    match kind {
        ExprKind::Const(v) => write!(f, "const {}", v),
        ExprKind::Time => write!(f, "time"),
        ExprKind::External { name } => write!(f, "external '{}'", name),
        ExprKind::Kernel { op, children } => {
            write!(f, "kernel {} (", op.name)?;
            for (i, c) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", c)?;
            }
            write!(f, ")")
        }
        ExprKind::Fold { op, child } => write!(f, "fold {} f{}", op.name, child.0),
        ExprKind::Intrinsic { instance, channel } => {
            write!(f, "intrinsic i{}.{}", instance.0, channel)
        }
        ExprKind::Extract { child, component } => write!(f, "extract {}[{}]", child, component),
        ExprKind::Construct { children } => {
            write!(f, "construct (")?;
            for (i, c) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", c)?;
            }
            write!(f, ")")
        }
        ExprKind::StateRead { state } => write!(f, "state st{}", state.0),
        ExprKind::PathDerivative { kind, child } => write!(f, "path.{} f{}", kind, child.0),
    }
}

fn write_tables(
    f: &mut fmt::Formatter<'_>,
    value_exprs: &[Expr],
    field_exprs: &[Expr],
    instances: &[InstanceDecl],
    states: &[StateDecl],
    state_writes: &[StateWrite],
    exports: &[ExportDecl],
) -> fmt::Result {
    writeln!(f, "values:")?;
    for (i, e) in value_exprs.iter().enumerate() {
        write!(f, "  v{}: ", i)?;
        write_kind(f, &e.kind)?;
        writeln!(f, " : {}", e.ty)?;
    }
    writeln!(f, "fields:")?;
    for (i, e) in field_exprs.iter().enumerate() {
        write!(f, "  f{}: ", i)?;
        write_kind(f, &e.kind)?;
        writeln!(f, " : {}", e.ty)?;
    }
    writeln!(f, "instances:")?;
    for (i, inst) in instances.iter().enumerate() {
        writeln!(
            f,
            "  i{}: '{}' x{} (block #{})",
            i, inst.label, inst.default_count, inst.origin.0
        )?;
    }
    writeln!(f, "states:")?;
    for (i, st) in states.iter().enumerate() {
        write!(f, "  st{}: stride {} init {}", i, st.stride, st.init)?;
        match st.instance {
            Some(inst) => writeln!(f, " over i{}", inst.0)?,
            None => writeln!(f, " single")?,
        }
    }
    writeln!(f, "state-writes:")?;
    for w in state_writes {
        writeln!(f, "  st{} <- {}", w.state.0, w.src)?;
    }
    writeln!(f, "exports:")?;
    for e in exports {
        writeln!(f, "  {}: {} (block #{})", e.name, e.expr, e.block.0)?;
    }
    Ok(())
}

impl fmt::Display for IrBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tables(
            f,
            &self.value_exprs,
            &self.field_exprs,
            &self.instances,
            &self.states,
            &self.state_writes,
            &self.exports,
        )
    }
}

impl fmt::Display for IrTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tables(
            f,
            &self.value_exprs,
            &self.field_exprs,
            &self.instances,
            &self.states,
            &self.state_writes,
            &self.exports,
        )
    }
}
