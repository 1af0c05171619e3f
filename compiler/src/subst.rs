// subst.rs — Substitution: the per-compilation axis-variable resolver
//
// One substitution lives for one compilation. Wiring constraints merge axis
// variables into groups (a union-find forest per axis kind, with path
// compression on the mutating side); binding a group to a concrete value is
// append-only. Callers only see merge, assign, and lookup; the forest is
// internal.
//
// Preconditions: variable ids come from `fresh_var` on this substitution.
// Postconditions: a bound group never changes its value.
// Failure modes: `TypeConflict` when two disagreeing concrete values meet.
// Side effects: none outside `self`.

use std::collections::HashMap;
use std::fmt;

use crate::canon::{
    AxisKind, AxisSlot, AxisValue, Binding, Branch, CanonicalType, Cardinality, Payload,
    Perspective, Temporality, Unit,
};
use crate::id::AxisVarId;
use crate::pass::StageCert;

// ── Conflict report ─────────────────────────────────────────────────────────

/// Two concrete values disagreed on one axis while merging a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeConflict {
    pub axis: AxisKind,
    pub left: AxisValue,
    pub right: AxisValue,
}

impl fmt::Display for TypeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conflict: {} vs {}",
            self.axis, self.left, self.right
        )
    }
}

impl std::error::Error for TypeConflict {}

// ── Per-axis union-find table ───────────────────────────────────────────────

#[derive(Debug)]
struct AxisTable<T> {
    /// Union-find forest; a variable absent from the map is its own root.
    parent: HashMap<AxisVarId, AxisVarId>,
    /// Concrete value per group root. Entries are only ever added.
    value: HashMap<AxisVarId, T>,
}

impl<T> Default for AxisTable<T> {
    fn default() -> Self {
        AxisTable {
            parent: HashMap::new(),
            value: HashMap::new(),
        }
    }
}

impl<T: Copy + PartialEq> AxisTable<T> {
    fn root(&self, v: AxisVarId) -> AxisVarId {
        let mut cur = v;
        while let Some(&p) = self.parent.get(&cur) {
            cur = p;
        }
        cur
    }

    /// Root lookup with path compression; only mutating operations compress,
    /// so read-side lookups can stay `&self`.
    fn root_compress(&mut self, v: AxisVarId) -> AxisVarId {
        let r = self.root(v);
        let mut cur = v;
        while cur != r {
            let next = self.parent[&cur];
            self.parent.insert(cur, r);
            cur = next;
        }
        r
    }

    fn resolve(&self, v: AxisVarId) -> Option<T> {
        self.value.get(&self.root(v)).copied()
    }

    /// Bind `v`'s group to `val`. Re-binding the same value is a no-op;
    /// a different value is a conflict and leaves the entry untouched.
    fn assign(&mut self, v: AxisVarId, val: T) -> Result<bool, (T, T)> {
        let r = self.root_compress(v);
        match self.value.get(&r) {
            Some(&existing) if existing != val => Err((existing, val)),
            Some(_) => Ok(false),
            None => {
                self.value.insert(r, val);
                Ok(true)
            }
        }
    }

    /// Merge the groups of `a` and `b`. When both groups carry a value the
    /// values must agree; a valued group absorbs an unvalued one.
    fn union(&mut self, a: AxisVarId, b: AxisVarId) -> Result<(), (T, T)> {
        let ra = self.root_compress(a);
        let rb = self.root_compress(b);
        if ra == rb {
            return Ok(());
        }
        match (self.value.get(&ra).copied(), self.value.get(&rb).copied()) {
            (Some(x), Some(y)) => {
                if x != y {
                    return Err((x, y));
                }
                self.parent.insert(rb, ra);
            }
            (Some(_), None) => {
                self.parent.insert(rb, ra);
            }
            (None, _) => {
                self.parent.insert(ra, rb);
            }
        }
        Ok(())
    }

    /// `Ok(true)` when the merge inserted a new binding.
    fn unify_slots(&mut self, a: &AxisSlot<T>, b: &AxisSlot<T>) -> Result<bool, (T, T)> {
        match (a, b) {
            (AxisSlot::Inst(x), AxisSlot::Inst(y)) => {
                if x == y {
                    Ok(false)
                } else {
                    Err((*x, *y))
                }
            }
            (AxisSlot::Inst(x), AxisSlot::Var(v)) | (AxisSlot::Var(v), AxisSlot::Inst(x)) => {
                self.assign(*v, *x)
            }
            (AxisSlot::Var(va), AxisSlot::Var(vb)) => self.union(*va, *vb).map(|_| false),
        }
    }

    /// Every recorded value entry must still agree with its group's
    /// resolution. Shadowed entries (a valued root linked under an equal
    /// root) are fine; a disagreeing one would mean a merge bug.
    fn entries_consistent(&self) -> bool {
        self.value
            .iter()
            .all(|(v, val)| self.resolve(*v) == Some(*val))
    }

    fn len(&self) -> usize {
        self.value.len()
    }
}

// ── Substitution ────────────────────────────────────────────────────────────

/// Global resolver state for one compilation.
#[derive(Debug, Default)]
pub struct Substitution {
    next_var: u32,
    /// Successful new bindings, for the append-only check.
    assignments: usize,
    payload: AxisTable<Payload>,
    unit: AxisTable<Unit>,
    cardinality: AxisTable<Cardinality>,
    temporality: AxisTable<Temporality>,
    binding: AxisTable<Binding>,
    perspective: AxisTable<Perspective>,
    branch: AxisTable<Branch>,
}

macro_rules! axis_accessors {
    ($field:ident, $ty:ty, $kind:expr, $wrap:path, $lookup:ident, $assign:ident) => {
        pub fn $lookup(&self, v: AxisVarId) -> Option<$ty> {
            self.$field.resolve(v)
        }

        pub fn $assign(&mut self, v: AxisVarId, val: $ty) -> Result<(), TypeConflict> {
            match self.$field.assign(v, val) {
                Ok(added) => {
                    if added {
                        self.assignments += 1;
                    }
                    Ok(())
                }
                Err((l, r)) => Err(TypeConflict {
                    axis: $kind,
                    left: $wrap(l),
                    right: $wrap(r),
                }),
            }
        }
    };
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh axis variable. Ids are monotonically increasing in
    /// allocation order, which keeps variable assignment deterministic.
    pub fn fresh_var(&mut self) -> AxisVarId {
        let id = AxisVarId(self.next_var);
        self.next_var += 1;
        id
    }

    axis_accessors!(payload, Payload, AxisKind::Payload, AxisValue::Payload, payload, assign_payload);
    axis_accessors!(unit, Unit, AxisKind::Unit, AxisValue::Unit, unit, assign_unit);
    axis_accessors!(
        cardinality,
        Cardinality,
        AxisKind::Cardinality,
        AxisValue::Cardinality,
        cardinality,
        assign_cardinality
    );
    axis_accessors!(
        temporality,
        Temporality,
        AxisKind::Temporality,
        AxisValue::Temporality,
        temporality,
        assign_temporality
    );
    axis_accessors!(binding, Binding, AxisKind::Binding, AxisValue::Binding, binding, assign_binding);
    axis_accessors!(
        perspective,
        Perspective,
        AxisKind::Perspective,
        AxisValue::Perspective,
        perspective,
        assign_perspective
    );
    axis_accessors!(branch, Branch, AxisKind::Branch, AxisValue::Branch, branch, assign_branch);

    /// Merge the equality constraint `a == b` axis by axis. The first
    /// disagreement aborts this constraint; earlier axes of the same
    /// constraint stay merged (entries are never rolled back).
    pub fn unify(&mut self, a: &CanonicalType, b: &CanonicalType) -> Result<(), TypeConflict> {
        let added = self
            .payload
            .unify_slots(&a.payload, &b.payload)
            .map_err(|(l, r)| conflict(AxisKind::Payload, AxisValue::Payload(l), AxisValue::Payload(r)))?;
        self.assignments += added as usize;
        let added = self
            .unit
            .unify_slots(&a.unit, &b.unit)
            .map_err(|(l, r)| conflict(AxisKind::Unit, AxisValue::Unit(l), AxisValue::Unit(r)))?;
        self.assignments += added as usize;
        let added = self
            .cardinality
            .unify_slots(&a.extent.cardinality, &b.extent.cardinality)
            .map_err(|(l, r)| {
                conflict(
                    AxisKind::Cardinality,
                    AxisValue::Cardinality(l),
                    AxisValue::Cardinality(r),
                )
            })?;
        self.assignments += added as usize;
        let added = self
            .temporality
            .unify_slots(&a.extent.temporality, &b.extent.temporality)
            .map_err(|(l, r)| {
                conflict(
                    AxisKind::Temporality,
                    AxisValue::Temporality(l),
                    AxisValue::Temporality(r),
                )
            })?;
        self.assignments += added as usize;
        let added = self
            .binding
            .unify_slots(&a.extent.binding, &b.extent.binding)
            .map_err(|(l, r)| conflict(AxisKind::Binding, AxisValue::Binding(l), AxisValue::Binding(r)))?;
        self.assignments += added as usize;
        let added = self
            .perspective
            .unify_slots(&a.extent.perspective, &b.extent.perspective)
            .map_err(|(l, r)| {
                conflict(
                    AxisKind::Perspective,
                    AxisValue::Perspective(l),
                    AxisValue::Perspective(r),
                )
            })?;
        self.assignments += added as usize;
        let added = self
            .branch
            .unify_slots(&a.extent.branch, &b.extent.branch)
            .map_err(|(l, r)| conflict(AxisKind::Branch, AxisValue::Branch(l), AxisValue::Branch(r)))?;
        self.assignments += added as usize;
        Ok(())
    }

    /// Number of variables allocated so far.
    pub fn var_count(&self) -> u32 {
        self.next_var
    }

    /// Number of groups bound to a concrete value.
    pub fn bound_count(&self) -> usize {
        self.payload.len()
            + self.unit.len()
            + self.cardinality.len()
            + self.temporality.len()
            + self.binding.len()
            + self.perspective.len()
            + self.branch.len()
    }

    /// Machine-checkable evidence for the unification obligations.
    pub fn verify(&self) -> UnifyCert {
        UnifyCert {
            u1_append_only: self.assignments == self.bound_count(),
            u2_groups_consistent: self.payload.entries_consistent()
                && self.unit.entries_consistent()
                && self.cardinality.entries_consistent()
                && self.temporality.entries_consistent()
                && self.binding.entries_consistent()
                && self.perspective.entries_consistent()
                && self.branch.entries_consistent(),
        }
    }
}

fn conflict(axis: AxisKind, left: AxisValue, right: AxisValue) -> TypeConflict {
    TypeConflict { axis, left, right }
}

// ── Certificate ─────────────────────────────────────────────────────────────

/// Evidence for the unification-stage obligations.
#[derive(Debug, Clone)]
pub struct UnifyCert {
    /// U1: no substitution entry was ever overwritten.
    pub u1_append_only: bool,
    /// U2: every value entry agrees with its group's resolution.
    pub u2_groups_consistent: bool,
}

impl StageCert for UnifyCert {
    fn all_pass(&self) -> bool {
        self.u1_append_only && self.u2_groups_consistent
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("U1 append-only substitution", self.u1_append_only),
            ("U2 consistent variable groups", self.u2_groups_consistent),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::{ConcreteType, Extent};
    use crate::id::InstanceId;

    fn sig_float() -> CanonicalType {
        CanonicalType::from_concrete(&ConcreteType::signal(Payload::Float))
    }

    fn var_type(subst: &mut Substitution) -> CanonicalType {
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
            contract: None,
        }
    }

    #[test]
    fn concrete_to_var_writes_the_entry() {
        let mut subst = Substitution::new();
        let generic = var_type(&mut subst);
        subst.unify(&sig_float(), &generic).unwrap();
        assert_eq!(
            subst.payload(generic.payload.var().unwrap()),
            Some(Payload::Float)
        );
        assert_eq!(
            subst.cardinality(generic.extent.cardinality.var().unwrap()),
            Some(Cardinality::One)
        );
    }

    #[test]
    fn equal_concretes_merge_to_noop() {
        let mut subst = Substitution::new();
        subst.unify(&sig_float(), &sig_float()).unwrap();
        assert_eq!(subst.bound_count(), 0);
    }

    #[test]
    fn disagreeing_concretes_conflict_with_both_values() {
        let mut subst = Substitution::new();
        let field = CanonicalType::from_concrete(&ConcreteType::field(
            Payload::Float,
            InstanceId(0),
        ));
        let err = subst.unify(&sig_float(), &field).unwrap_err();
        assert_eq!(err.axis, AxisKind::Cardinality);
        assert_eq!(err.left, AxisValue::Cardinality(Cardinality::One));
        assert_eq!(err.right, AxisValue::Cardinality(Cardinality::Many));
    }

    #[test]
    fn union_propagates_later_assignment() {
        let mut subst = Substitution::new();
        let a = var_type(&mut subst);
        let b = var_type(&mut subst);
        subst.unify(&a, &b).unwrap();
        // Binding through one side resolves the other.
        subst
            .assign_payload(b.payload.var().unwrap(), Payload::Vec3)
            .unwrap();
        assert_eq!(subst.payload(a.payload.var().unwrap()), Some(Payload::Vec3));
    }

    #[test]
    fn rebinding_same_value_is_noop_and_conflict_preserves_entry() {
        let mut subst = Substitution::new();
        let v = subst.fresh_var();
        subst.assign_unit(v, Unit::Hertz).unwrap();
        subst.assign_unit(v, Unit::Hertz).unwrap();
        let err = subst.assign_unit(v, Unit::Pixels).unwrap_err();
        assert_eq!(err.axis, AxisKind::Unit);
        assert_eq!(subst.unit(v), Some(Unit::Hertz));
    }

    #[test]
    fn transitive_chain_resolves_through_roots() {
        let mut subst = Substitution::new();
        let a = var_type(&mut subst);
        let b = var_type(&mut subst);
        let c = var_type(&mut subst);
        subst.unify(&a, &b).unwrap();
        subst.unify(&b, &c).unwrap();
        subst.unify(&sig_float(), &a).unwrap();
        assert_eq!(subst.payload(c.payload.var().unwrap()), Some(Payload::Float));
        let cert = subst.verify();
        assert!(cert.all_pass(), "obligations: {:?}", cert.obligations());
    }
}
