// registry.rs — Block definition registry
//
// Maps block type names to signatures, cardinality behavior, and lowering
// functions. The registry is the compiler's only source of block
// semantics; patches refer to definitions purely by name, so the registry
// fingerprint is part of every program's provenance.
//
// Preconditions: none.
// Postconditions: `register` keeps the registry name-unique; lookups are
//   stable for the lifetime of the registry.
// Failure modes: duplicate registration → `RegistryError`.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;

use crate::canon::{
    AxisKind, AxisSlot, Binding, Branch, CanonicalType, Cardinality, Extent, Payload, Perspective,
    SemanticContract, Temporality, Unit,
};
use crate::cardinality::{BroadcastPolicy, CardinalityMode, LaneCoupling};
use crate::id::AxisVarId;
use crate::lower::{LowerCtx, LowerFail, LowerOutput};
use crate::subst::Substitution;

// ── Type templates ───────────────────────────────────────────────────────

/// One axis of a port template, before per-compilation instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSlot<T> {
    /// Pinned to a concrete axis value.
    Inst(T),
    /// Shared type variable: every slot in the same block signature using
    /// the same name on the same axis instantiates to one variable.
    Param(&'static str),
    /// Independent type variable, fresh per slot.
    Fresh,
}

/// A port type with per-axis slots. Instantiation turns it into a
/// `CanonicalType` with fresh variables owned by the compilation's
/// substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeTemplate {
    pub payload: TemplateSlot<Payload>,
    pub unit: TemplateSlot<Unit>,
    pub cardinality: TemplateSlot<Cardinality>,
    pub temporality: TemplateSlot<Temporality>,
    pub binding: TemplateSlot<Binding>,
    pub perspective: TemplateSlot<Perspective>,
    pub branch: TemplateSlot<Branch>,
    pub contract: Option<&'static str>,
}

impl TypeTemplate {
    /// Pinned payload, everything else open. The workhorse: most ports
    /// accept any cardinality and let the resolver decide.
    pub fn of(payload: Payload) -> Self {
        TypeTemplate {
            payload: TemplateSlot::Inst(payload),
            unit: TemplateSlot::Fresh,
            cardinality: TemplateSlot::Fresh,
            temporality: TemplateSlot::Fresh,
            binding: TemplateSlot::Fresh,
            perspective: TemplateSlot::Fresh,
            branch: TemplateSlot::Fresh,
            contract: None,
        }
    }

    /// Payload-generic port sharing `param` across the signature.
    pub fn generic(param: &'static str) -> Self {
        TypeTemplate {
            payload: TemplateSlot::Param(param),
            ..TypeTemplate::of(Payload::Float)
        }
    }

    /// Pinned payload and one-cardinality.
    pub fn signal(payload: Payload) -> Self {
        TypeTemplate {
            cardinality: TemplateSlot::Inst(Cardinality::One),
            ..TypeTemplate::of(payload)
        }
    }

    /// Pinned payload and many-cardinality.
    pub fn field(payload: Payload) -> Self {
        TypeTemplate {
            cardinality: TemplateSlot::Inst(Cardinality::Many),
            ..TypeTemplate::of(payload)
        }
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = TemplateSlot::Inst(unit);
        self
    }

    pub fn unit_param(mut self, param: &'static str) -> Self {
        self.unit = TemplateSlot::Param(param);
        self
    }

    /// Field-cardinality variant of a generic template.
    pub fn many(mut self) -> Self {
        self.cardinality = TemplateSlot::Inst(Cardinality::Many);
        self
    }

    pub fn temporality(mut self, t: Temporality) -> Self {
        self.temporality = TemplateSlot::Inst(t);
        self
    }

    pub fn contract(mut self, c: &'static str) -> Self {
        self.contract = Some(c);
        self
    }

    /// Instantiate against a substitution, sharing `Param` slots through
    /// `memo` (one memo per block instantiation).
    pub fn instantiate(&self, subst: &mut Substitution, memo: &mut ParamMemo) -> CanonicalType {
        CanonicalType {
            payload: memo.slot(AxisKind::Payload, &self.payload, subst),
            unit: memo.slot(AxisKind::Unit, &self.unit, subst),
            extent: Extent {
                cardinality: memo.slot(AxisKind::Cardinality, &self.cardinality, subst),
                temporality: memo.slot(AxisKind::Temporality, &self.temporality, subst),
                binding: memo.slot(AxisKind::Binding, &self.binding, subst),
                perspective: memo.slot(AxisKind::Perspective, &self.perspective, subst),
                branch: memo.slot(AxisKind::Branch, &self.branch, subst),
            },
            contract: self.contract.map(|c| SemanticContract(c.to_string())),
        }
    }
}

impl fmt::Display for TypeTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn slot<T: fmt::Display>(s: &TemplateSlot<T>) -> String {
            match s {
                TemplateSlot::Inst(v) => v.to_string(),
                TemplateSlot::Param(p) => format!("${p}"),
                TemplateSlot::Fresh => "?".to_string(),
            }
        }
        write!(
            f,
            "payload={} unit={} card={} temp={} bind={} persp={} branch={}",
            slot(&self.payload),
            slot(&self.unit),
            slot(&self.cardinality),
            slot(&self.temporality),
            slot(&self.binding),
            slot(&self.perspective),
            slot(&self.branch),
        )?;
        if let Some(c) = self.contract {
            write!(f, " contract={c}")?;
        }
        Ok(())
    }
}

/// Shares `Param` variables across the slots of one block instantiation.
#[derive(Debug, Default)]
pub struct ParamMemo {
    vars: HashMap<(AxisKind, &'static str), AxisVarId>,
}

impl ParamMemo {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot<T: Copy>(
        &mut self,
        axis: AxisKind,
        template: &TemplateSlot<T>,
        subst: &mut Substitution,
    ) -> AxisSlot<T> {
        match template {
            TemplateSlot::Inst(v) => AxisSlot::Inst(*v),
            TemplateSlot::Fresh => AxisSlot::Var(subst.fresh_var()),
            TemplateSlot::Param(name) => {
                let var = *self
                    .vars
                    .entry((axis, name))
                    .or_insert_with(|| subst.fresh_var());
                AxisSlot::Var(var)
            }
        }
    }
}

// ── Signatures ───────────────────────────────────────────────────────────

/// One declared port.
#[derive(Debug, Clone, Copy)]
pub struct PortDecl {
    pub name: &'static str,
    pub template: TypeTemplate,
    pub required: bool,
}

/// A block's port layout.
#[derive(Debug, Clone, Default)]
pub struct BlockSig {
    pub inputs: Vec<PortDecl>,
    pub outputs: Vec<PortDecl>,
    /// Port whose presence satisfies `RequireBroadcastExpr`.
    pub broadcast_port: Option<&'static str>,
}

/// A signature instantiated for one block in one compilation: every
/// template slot is now either pinned or a live variable in the
/// compilation's substitution.
#[derive(Debug, Clone)]
pub struct SigInstance {
    pub inputs: Vec<PortType>,
    pub outputs: Vec<PortType>,
}

#[derive(Debug, Clone)]
pub struct PortType {
    pub name: &'static str,
    pub required: bool,
    pub ty: CanonicalType,
}

impl BlockSig {
    pub fn instantiate(&self, subst: &mut Substitution) -> SigInstance {
        let mut memo = ParamMemo::new();
        let port = |p: &PortDecl, subst: &mut Substitution, memo: &mut ParamMemo| PortType {
            name: p.name,
            required: p.required,
            ty: p.template.instantiate(subst, memo),
        };
        SigInstance {
            inputs: self
                .inputs
                .iter()
                .map(|p| port(p, subst, &mut memo))
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|p| port(p, subst, &mut memo))
                .collect(),
        }
    }
}

// ── Block definitions ────────────────────────────────────────────────────

/// Lowering entry point: builds the block's IR from its wired inputs.
pub type LowerFn = fn(&mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail>;

/// Everything the compiler knows about one block type.
pub struct BlockDef {
    pub name: &'static str,
    pub signature: BlockSig,
    pub cardinality_mode: CardinalityMode,
    pub lane_coupling: LaneCoupling,
    pub broadcast_policy: BroadcastPolicy,
    /// Inputs read last frame's value, so wires into this block do not
    /// constrain evaluation order. Lowering uses this to cut cycles.
    pub feedback: bool,
    pub lower: LowerFn,
}

impl fmt::Debug for BlockDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDef")
            .field("name", &self.name)
            .field("cardinality_mode", &self.cardinality_mode)
            .field("lane_coupling", &self.lane_coupling)
            .field("broadcast_policy", &self.broadcast_policy)
            .field("feedback", &self.feedback)
            .finish_non_exhaustive()
    }
}

impl BlockDef {
    pub fn new(name: &'static str, lower: LowerFn) -> Self {
        BlockDef {
            name,
            signature: BlockSig::default(),
            cardinality_mode: CardinalityMode::Preserve,
            lane_coupling: LaneCoupling::LaneLocal,
            broadcast_policy: BroadcastPolicy::AllowZipSig,
            feedback: false,
            lower,
        }
    }

    pub fn input(mut self, name: &'static str, template: TypeTemplate) -> Self {
        self.signature.inputs.push(PortDecl {
            name,
            template,
            required: true,
        });
        self
    }

    pub fn optional_input(mut self, name: &'static str, template: TypeTemplate) -> Self {
        self.signature.inputs.push(PortDecl {
            name,
            template,
            required: false,
        });
        self
    }

    pub fn output(mut self, name: &'static str, template: TypeTemplate) -> Self {
        self.signature.outputs.push(PortDecl {
            name,
            template,
            required: true,
        });
        self
    }

    pub fn mode(mut self, mode: CardinalityMode) -> Self {
        self.cardinality_mode = mode;
        self
    }

    pub fn coupling(mut self, coupling: LaneCoupling) -> Self {
        self.lane_coupling = coupling;
        self
    }

    pub fn policy(mut self, policy: BroadcastPolicy) -> Self {
        self.broadcast_policy = policy;
        self
    }

    pub fn broadcast_port(mut self, port: &'static str) -> Self {
        self.signature.broadcast_port = Some(port);
        self
    }

    pub fn feedback(mut self) -> Self {
        self.feedback = true;
        self
    }
}

// ── Errors ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum RegistryError {
    DuplicateBlockType { name: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateBlockType { name } => {
                write!(f, "block type '{}' is already registered", name)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

// ── Registry ─────────────────────────────────────────────────────────────

/// Block definition registry. Iteration order is registration order;
/// the fingerprint sorts by name so it is registration-order independent.
pub struct Registry {
    defs: IndexMap<String, BlockDef>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            defs: IndexMap::new(),
        }
    }

    pub fn register(&mut self, def: BlockDef) -> Result<(), RegistryError> {
        if self.defs.contains_key(def.name) {
            return Err(RegistryError::DuplicateBlockType {
                name: def.name.to_string(),
            });
        }
        self.defs.insert(def.name.to_string(), def);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&BlockDef> {
        self.defs.get(name)
    }

    pub fn defs(&self) -> impl Iterator<Item = &BlockDef> {
        self.defs.values()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Canonical compact JSON of every definition, sorted by name.
    /// Feeds the registry fingerprint, so the encoding must stay stable:
    /// adding a field here invalidates every cached build.
    pub fn canonical_json(&self) -> String {
        let mut names: Vec<&str> = self.defs.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();

        let blocks: Vec<serde_json::Value> = names
            .iter()
            .map(|name| {
                let def = &self.defs[*name];
                let ports = |ports: &[PortDecl]| -> Vec<serde_json::Value> {
                    ports
                        .iter()
                        .map(|p| {
                            serde_json::json!({
                                "name": p.name,
                                "required": p.required,
                                "type": p.template.to_string(),
                            })
                        })
                        .collect()
                };
                serde_json::json!({
                    "name": def.name,
                    "mode": def.cardinality_mode,
                    "coupling": def.lane_coupling,
                    "policy": def.broadcast_policy,
                    "broadcast": def.signature.broadcast_port,
                    "feedback": def.feedback,
                    "inputs": ports(&def.signature.inputs),
                    "outputs": ports(&def.signature.outputs),
                })
            })
            .collect();

        serde_json::json!({ "blocks": blocks }).to_string()
    }
}
