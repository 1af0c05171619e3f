// canon.rs — Canonical axis-based type model
//
// A port's type is decomposed into seven independent axes: payload, unit,
// and the five extent axes (cardinality, temporality, binding, perspective,
// branch). During lowering each axis is either a concrete value or a
// variable to be resolved through the compilation's substitution.
//
// Preconditions: none (types plus resolution helpers).
// Postconditions: `finalize` either yields a fully concrete type or names
//   the exact axis kind and variable id that blocked it.
// Failure modes: `UnresolvedAxisVar` from `finalize`.
// Side effects: none.

use std::fmt;

use crate::id::{AxisVarId, InstanceId};
use crate::subst::Substitution;

// ── Axis kinds ──────────────────────────────────────────────────────────────

/// The seven independent dimensions of a canonical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisKind {
    Payload,
    Unit,
    Cardinality,
    Temporality,
    Binding,
    Perspective,
    Branch,
}

impl AxisKind {
    pub const ALL: [AxisKind; 7] = [
        AxisKind::Payload,
        AxisKind::Unit,
        AxisKind::Cardinality,
        AxisKind::Temporality,
        AxisKind::Binding,
        AxisKind::Perspective,
        AxisKind::Branch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AxisKind::Payload => "payload",
            AxisKind::Unit => "unit",
            AxisKind::Cardinality => "cardinality",
            AxisKind::Temporality => "temporality",
            AxisKind::Binding => "binding",
            AxisKind::Perspective => "perspective",
            AxisKind::Branch => "branch",
        }
    }
}

impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ── Per-axis value enums ────────────────────────────────────────────────────

/// What one value is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Payload {
    Float,
    Bool,
    Vec2,
    Vec3,
    Vec4,
}

impl Payload {
    /// Number of f64 lanes a value of this payload occupies.
    pub fn width(&self) -> u32 {
        match self {
            Payload::Float | Payload::Bool => 1,
            Payload::Vec2 => 2,
            Payload::Vec3 => 3,
            Payload::Vec4 => 4,
        }
    }
}

/// Physical or screen-space unit attached to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Dimensionless,
    Milliseconds,
    Hertz,
    Pixels,
    Normalized,
    Radians,
}

/// Signal (one value per frame) vs field (one value per element).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    One,
    Many,
}

/// Whether a value can change from frame to frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Temporality {
    Static,
    Varying,
}

/// Which domain instance a field is bound to. Signals are `Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Free,
    Bound(InstanceId),
}

/// Coordinate frame the value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Perspective {
    Local,
    World,
    View,
}

/// Conditional-branch context of the producing block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Main,
    Variant(u16),
}

/// A concrete value on any axis, tagged by kind. Used where values of
/// different axes travel together (conflict reports, substitution dumps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisValue {
    Payload(Payload),
    Unit(Unit),
    Cardinality(Cardinality),
    Temporality(Temporality),
    Binding(Binding),
    Perspective(Perspective),
    Branch(Branch),
}

impl AxisValue {
    pub fn kind(&self) -> AxisKind {
        match self {
            AxisValue::Payload(_) => AxisKind::Payload,
            AxisValue::Unit(_) => AxisKind::Unit,
            AxisValue::Cardinality(_) => AxisKind::Cardinality,
            AxisValue::Temporality(_) => AxisKind::Temporality,
            AxisValue::Binding(_) => AxisKind::Binding,
            AxisValue::Perspective(_) => AxisKind::Perspective,
            AxisValue::Branch(_) => AxisKind::Branch,
        }
    }
}

impl fmt::Display for AxisValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisValue::Payload(v) => write!(f, "{}", v),
            AxisValue::Unit(v) => write!(f, "{}", v),
            AxisValue::Cardinality(v) => write!(f, "{}", v),
            AxisValue::Temporality(v) => write!(f, "{}", v),
            AxisValue::Binding(v) => write!(f, "{}", v),
            AxisValue::Perspective(v) => write!(f, "{}", v),
            AxisValue::Branch(v) => write!(f, "{}", v),
        }
    }
}

fn payload_str(p: Payload) -> &'static str {
    match p {
        Payload::Float => "float",
        Payload::Bool => "bool",
        Payload::Vec2 => "vec2",
        Payload::Vec3 => "vec3",
        Payload::Vec4 => "vec4",
    }
}

// Dimensionless prints as "1" standalone; type displays omit it entirely.
fn unit_str(u: Unit) -> &'static str {
    match u {
        Unit::Dimensionless => "1",
        Unit::Milliseconds => "ms",
        Unit::Hertz => "hz",
        Unit::Pixels => "px",
        Unit::Normalized => "norm",
        Unit::Radians => "rad",
    }
}

fn cardinality_str(c: Cardinality) -> &'static str {
    match c {
        Cardinality::One => "one",
        Cardinality::Many => "many",
    }
}

fn temporality_str(t: Temporality) -> &'static str {
    match t {
        Temporality::Static => "static",
        Temporality::Varying => "varying",
    }
}

fn perspective_str(p: Perspective) -> &'static str {
    match p {
        Perspective::Local => "local",
        Perspective::World => "world",
        Perspective::View => "view",
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", payload_str(*self))
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", unit_str(*self))
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", cardinality_str(*self))
    }
}

impl fmt::Display for Temporality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", temporality_str(*self))
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Free => write!(f, "free"),
            Binding::Bound(i) => write!(f, "inst{}", i.0),
        }
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", perspective_str(*self))
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Main => write!(f, "main"),
            Branch::Variant(n) => write!(f, "b{}", n),
        }
    }
}

// ── Axis slots and canonical types ──────────────────────────────────────────

/// One axis of an in-flight type: concrete, or a variable awaiting the
/// substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisSlot<T> {
    Inst(T),
    Var(AxisVarId),
}

impl<T: Copy> AxisSlot<T> {
    pub fn inst(&self) -> Option<T> {
        match self {
            AxisSlot::Inst(v) => Some(*v),
            AxisSlot::Var(_) => None,
        }
    }

    pub fn var(&self) -> Option<AxisVarId> {
        match self {
            AxisSlot::Inst(_) => None,
            AxisSlot::Var(v) => Some(*v),
        }
    }
}

/// The five extent axes of a canonical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub cardinality: AxisSlot<Cardinality>,
    pub temporality: AxisSlot<Temporality>,
    pub binding: AxisSlot<Binding>,
    pub perspective: AxisSlot<Perspective>,
    pub branch: AxisSlot<Branch>,
}

/// A semantic contract attached to a type and carried through substitution
/// untouched (e.g. "clamp01"). Contracts constrain consumers, not the type
/// algebra.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticContract(pub String);

/// The full, possibly still variable-bearing type of a value on a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalType {
    pub payload: AxisSlot<Payload>,
    pub unit: AxisSlot<Unit>,
    pub extent: Extent,
    pub contract: Option<SemanticContract>,
}

/// The extent of a fully resolved type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConcreteExtent {
    pub cardinality: Cardinality,
    pub temporality: Temporality,
    pub binding: Binding,
    pub perspective: Perspective,
    pub branch: Branch,
}

/// A fully resolved type: every axis concrete. Only concrete types reach
/// the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcreteType {
    pub payload: Payload,
    pub unit: Unit,
    pub extent: ConcreteExtent,
    pub contract: Option<SemanticContract>,
}

/// Raised by `finalize` when an axis variable has no substitution entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnresolvedAxisVar {
    pub axis: AxisKind,
    pub var: AxisVarId,
}

impl fmt::Display for UnresolvedAxisVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unresolved {} variable ?{}", self.axis, self.var.0)
    }
}

impl std::error::Error for UnresolvedAxisVar {}

// ── Constructors ────────────────────────────────────────────────────────────

impl ConcreteType {
    /// A varying dimensionless signal of the given payload.
    pub fn signal(payload: Payload) -> ConcreteType {
        ConcreteType {
            payload,
            unit: Unit::Dimensionless,
            extent: ConcreteExtent {
                cardinality: Cardinality::One,
                temporality: Temporality::Varying,
                binding: Binding::Free,
                perspective: Perspective::Local,
                branch: Branch::Main,
            },
            contract: None,
        }
    }

    /// A varying dimensionless field of the given payload over `instance`.
    pub fn field(payload: Payload, instance: InstanceId) -> ConcreteType {
        ConcreteType {
            payload,
            unit: Unit::Dimensionless,
            extent: ConcreteExtent {
                cardinality: Cardinality::Many,
                temporality: Temporality::Varying,
                binding: Binding::Bound(instance),
                perspective: Perspective::Local,
                branch: Branch::Main,
            },
            contract: None,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> ConcreteType {
        self.unit = unit;
        self
    }

    pub fn with_temporality(mut self, temporality: Temporality) -> ConcreteType {
        self.extent.temporality = temporality;
        self
    }

    pub fn with_contract(mut self, contract: SemanticContract) -> ConcreteType {
        self.contract = Some(contract);
        self
    }

    /// Lane width of one value of this type.
    pub fn stride(&self) -> u32 {
        self.payload.width()
    }
}

impl CanonicalType {
    /// Lift a concrete type into the canonical form (all axes `Inst`).
    pub fn from_concrete(ty: &ConcreteType) -> CanonicalType {
        CanonicalType {
            payload: AxisSlot::Inst(ty.payload),
            unit: AxisSlot::Inst(ty.unit),
            extent: Extent {
                cardinality: AxisSlot::Inst(ty.extent.cardinality),
                temporality: AxisSlot::Inst(ty.extent.temporality),
                binding: AxisSlot::Inst(ty.extent.binding),
                perspective: AxisSlot::Inst(ty.extent.perspective),
                branch: AxisSlot::Inst(ty.extent.branch),
            },
            contract: ty.contract.clone(),
        }
    }

    /// True if every axis is already `Inst` (no substitution needed).
    pub fn is_concrete(&self) -> bool {
        self.payload.inst().is_some()
            && self.unit.inst().is_some()
            && self.extent.cardinality.inst().is_some()
            && self.extent.temporality.inst().is_some()
            && self.extent.binding.inst().is_some()
            && self.extent.perspective.inst().is_some()
            && self.extent.branch.inst().is_some()
    }
}

// ── Resolution against a substitution ───────────────────────────────────────

fn resolve_axis<T: Copy>(
    slot: &AxisSlot<T>,
    axis: AxisKind,
    lookup: impl FnOnce(AxisVarId) -> Option<T>,
) -> Result<T, UnresolvedAxisVar> {
    match slot {
        AxisSlot::Inst(v) => Ok(*v),
        AxisSlot::Var(var) => lookup(*var).ok_or(UnresolvedAxisVar { axis, var: *var }),
    }
}

fn partial_axis<T: Copy>(
    slot: &AxisSlot<T>,
    lookup: impl FnOnce(AxisVarId) -> Option<T>,
) -> AxisSlot<T> {
    match slot {
        AxisSlot::Inst(v) => AxisSlot::Inst(*v),
        AxisSlot::Var(var) => match lookup(*var) {
            Some(v) => AxisSlot::Inst(v),
            // Unresolved axes keep their original variable id, which makes
            // repeated application a fixpoint.
            None => AxisSlot::Var(*var),
        },
    }
}

impl CanonicalType {
    /// Resolve every axis through `subst` into a fully concrete type.
    ///
    /// Fails on the first axis whose variable has no substitution entry,
    /// naming the axis kind and the variable id. Axes are checked in the
    /// fixed `AxisKind::ALL` order so the reported variable is stable.
    pub fn finalize(&self, subst: &Substitution) -> Result<ConcreteType, UnresolvedAxisVar> {
        let payload = resolve_axis(&self.payload, AxisKind::Payload, |v| subst.payload(v))?;
        let unit = resolve_axis(&self.unit, AxisKind::Unit, |v| subst.unit(v))?;
        let cardinality = resolve_axis(&self.extent.cardinality, AxisKind::Cardinality, |v| {
            subst.cardinality(v)
        })?;
        let temporality = resolve_axis(&self.extent.temporality, AxisKind::Temporality, |v| {
            subst.temporality(v)
        })?;
        let binding = resolve_axis(&self.extent.binding, AxisKind::Binding, |v| {
            subst.binding(v)
        })?;
        let perspective = resolve_axis(&self.extent.perspective, AxisKind::Perspective, |v| {
            subst.perspective(v)
        })?;
        let branch = resolve_axis(&self.extent.branch, AxisKind::Branch, |v| subst.branch(v))?;

        Ok(ConcreteType {
            payload,
            unit,
            extent: ConcreteExtent {
                cardinality,
                temporality,
                binding,
                perspective,
                branch,
            },
            contract: self.contract.clone(),
        })
    }

    /// The readiness probe behind `finalize`: true exactly when `finalize`
    /// would succeed. Constructs nothing.
    pub fn is_canonicalizable(&self, subst: &Substitution) -> bool {
        fn ready<T: Copy>(slot: &AxisSlot<T>, lookup: impl FnOnce(AxisVarId) -> Option<T>) -> bool {
            match slot {
                AxisSlot::Inst(_) => true,
                AxisSlot::Var(v) => lookup(*v).is_some(),
            }
        }
        ready(&self.payload, |v| subst.payload(v))
            && ready(&self.unit, |v| subst.unit(v))
            && ready(&self.extent.cardinality, |v| subst.cardinality(v))
            && ready(&self.extent.temporality, |v| subst.temporality(v))
            && ready(&self.extent.binding, |v| subst.binding(v))
            && ready(&self.extent.perspective, |v| subst.perspective(v))
            && ready(&self.extent.branch, |v| subst.branch(v))
    }

    /// Resolve the axes `subst` already knows, leave the rest as their
    /// original variables, and carry the contract through unchanged.
    /// Applying this twice with the same substitution is a no-op.
    pub fn apply_partial(&self, subst: &Substitution) -> CanonicalType {
        CanonicalType {
            payload: partial_axis(&self.payload, |v| subst.payload(v)),
            unit: partial_axis(&self.unit, |v| subst.unit(v)),
            extent: Extent {
                cardinality: partial_axis(&self.extent.cardinality, |v| subst.cardinality(v)),
                temporality: partial_axis(&self.extent.temporality, |v| subst.temporality(v)),
                binding: partial_axis(&self.extent.binding, |v| subst.binding(v)),
                perspective: partial_axis(&self.extent.perspective, |v| subst.perspective(v)),
                branch: partial_axis(&self.extent.branch, |v| subst.branch(v)),
            },
            contract: self.contract.clone(),
        }
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

fn write_slot<T: Copy>(
    f: &mut fmt::Formatter<'_>,
    slot: &AxisSlot<T>,
    show: impl Fn(T) -> String,
) -> fmt::Result {
    match slot {
        AxisSlot::Inst(v) => write!(f, "{}", show(*v)),
        AxisSlot::Var(var) => write!(f, "?{}", var.0),
    }
}

impl fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", payload_str(self.payload))?;
        if self.unit != Unit::Dimensionless {
            write!(f, "[{}]", unit_str(self.unit))?;
        }
        match self.extent.binding {
            Binding::Bound(i) if self.extent.cardinality == Cardinality::Many => {
                write!(f, "·many(i{})", i.0)?
            }
            _ => write!(f, "·{}", cardinality_str(self.extent.cardinality))?,
        }
        if self.extent.temporality == Temporality::Static {
            write!(f, "·static")?;
        }
        if self.extent.perspective != Perspective::Local {
            write!(f, "·{}", perspective_str(self.extent.perspective))?;
        }
        if let Branch::Variant(n) = self.extent.branch {
            write!(f, "·b{}", n)?;
        }
        if let Some(SemanticContract(c)) = &self.contract {
            write!(f, "·{{{}}}", c)?;
        }
        Ok(())
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_slot(f, &self.payload, |p| payload_str(p).to_string())?;
        if self.unit != AxisSlot::Inst(Unit::Dimensionless) {
            write!(f, "[")?;
            write_slot(f, &self.unit, |u| unit_str(u).to_string())?;
            write!(f, "]")?;
        }
        write!(f, "·")?;
        write_slot(f, &self.extent.cardinality, |c| {
            cardinality_str(c).to_string()
        })?;
        match self.extent.binding {
            AxisSlot::Inst(Binding::Bound(i)) => write!(f, "(i{})", i.0)?,
            AxisSlot::Inst(Binding::Free) => {}
            AxisSlot::Var(v) => write!(f, "(?{})", v.0)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subst::Substitution;

    fn all_var_type(subst: &mut Substitution) -> CanonicalType {
        CanonicalType {
            payload: AxisSlot::Var(subst.fresh_var()),
            unit: AxisSlot::Var(subst.fresh_var()),
            extent: Extent {
                cardinality: AxisSlot::Var(subst.fresh_var()),
                temporality: AxisSlot::Var(subst.fresh_var()),
                binding: AxisSlot::Var(subst.fresh_var()),
                perspective: AxisSlot::Var(subst.fresh_var()),
                branch: AxisSlot::Var(subst.fresh_var()),
            },
            contract: Some(SemanticContract("clamp01".into())),
        }
    }

    #[test]
    fn finalize_succeeds_when_every_var_is_bound() {
        let mut subst = Substitution::new();
        let ty = all_var_type(&mut subst);
        subst
            .assign_payload(ty.payload.var().unwrap(), Payload::Vec2)
            .unwrap();
        subst
            .assign_unit(ty.unit.var().unwrap(), Unit::Pixels)
            .unwrap();
        subst
            .assign_cardinality(ty.extent.cardinality.var().unwrap(), Cardinality::Many)
            .unwrap();
        subst
            .assign_temporality(ty.extent.temporality.var().unwrap(), Temporality::Varying)
            .unwrap();
        subst
            .assign_binding(ty.extent.binding.var().unwrap(), Binding::Bound(InstanceId(0)))
            .unwrap();
        subst
            .assign_perspective(ty.extent.perspective.var().unwrap(), Perspective::World)
            .unwrap();
        subst
            .assign_branch(ty.extent.branch.var().unwrap(), Branch::Main)
            .unwrap();

        let concrete = ty.finalize(&subst).unwrap();
        assert_eq!(concrete.payload, Payload::Vec2);
        assert_eq!(concrete.extent.cardinality, Cardinality::Many);
        assert_eq!(concrete.contract, Some(SemanticContract("clamp01".into())));
        assert!(ty.is_canonicalizable(&subst));
    }

    #[test]
    fn finalize_names_the_missing_axis_and_var() {
        let mut subst = Substitution::new();
        let ty = all_var_type(&mut subst);
        subst
            .assign_payload(ty.payload.var().unwrap(), Payload::Float)
            .unwrap();
        // Unit left unbound: it is the first unresolved axis in ALL order.
        let err = ty.finalize(&subst).unwrap_err();
        assert_eq!(err.axis, AxisKind::Unit);
        assert_eq!(err.var, ty.unit.var().unwrap());
        assert!(!ty.is_canonicalizable(&subst));
    }

    #[test]
    fn apply_partial_is_idempotent_and_keeps_contract() {
        let mut subst = Substitution::new();
        let ty = all_var_type(&mut subst);
        subst
            .assign_payload(ty.payload.var().unwrap(), Payload::Float)
            .unwrap();
        subst
            .assign_cardinality(ty.extent.cardinality.var().unwrap(), Cardinality::One)
            .unwrap();

        let once = ty.apply_partial(&subst);
        let twice = once.apply_partial(&subst);
        assert_eq!(once, twice);
        assert_eq!(once.payload, AxisSlot::Inst(Payload::Float));
        assert_eq!(once.extent.cardinality, AxisSlot::Inst(Cardinality::One));
        assert_eq!(once.unit, ty.unit);
        assert_eq!(once.contract, Some(SemanticContract("clamp01".into())));
    }

    #[test]
    fn concrete_display_is_compact() {
        let sig = ConcreteType::signal(Payload::Float).with_unit(Unit::Hertz);
        assert_eq!(format!("{}", sig), "float[hz]·one");
        let fld = ConcreteType::field(Payload::Vec2, InstanceId(3));
        assert_eq!(format!("{}", fld), "vec2·many(i3)");
    }
}
