// id.rs — Stable semantic identifiers for compiler artifacts
//
// These IDs provide deterministic identity for everything the compiler
// allocates. They are handed out in visit order (blocks in declaration
// order, ports in signature order), so two compilations of the same patch
// assign identical IDs throughout.

/// Stable identifier for a block instantiation in a patch.
///
/// Equal to the block's index in the patch's declaration order; the
/// scheduler uses it as the deterministic tie-break key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Stable identifier for a signal (cardinality-one) expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueExprId(pub u32);

/// Stable identifier for a field (cardinality-many) expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldExprId(pub u32);

/// An expression id in either table.
///
/// Children of a field expression may point at value expressions; those
/// operands are broadcast across lanes when the field is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExprId {
    Value(ValueExprId),
    Field(FieldExprId),
}

impl ExprId {
    pub fn as_value(self) -> Option<ValueExprId> {
        match self {
            ExprId::Value(v) => Some(v),
            ExprId::Field(_) => None,
        }
    }

    pub fn as_field(self) -> Option<FieldExprId> {
        match self {
            ExprId::Field(fe) => Some(fe),
            ExprId::Value(_) => None,
        }
    }
}

impl From<ValueExprId> for ExprId {
    fn from(id: ValueExprId) -> ExprId {
        ExprId::Value(id)
    }
}

impl From<FieldExprId> for ExprId {
    fn from(id: FieldExprId) -> ExprId {
        ExprId::Field(id)
    }
}

impl std::fmt::Display for ExprId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExprId::Value(v) => write!(f, "v{}", v.0),
            ExprId::Field(fe) => write!(f, "f{}", fe.0),
        }
    }
}

/// Stable identifier for a per-frame storage cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

/// Stable identifier for an axis variable inside one compilation's
/// substitution. Variable ids are never reused across axis kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AxisVarId(pub u32);

/// Stable identifier for a spawned domain instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

/// Stable identifier for a cross-frame state cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

/// Allocator for instance and state ids. Produces monotonically increasing
/// IDs in allocation order, ensuring deterministic assignment.
///
/// Expression and slot ids are indices into their owning tables and need no
/// allocator; axis variable ids are allocated by the substitution.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_instance: u32,
    next_state: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_instance(&mut self) -> InstanceId {
        let id = InstanceId(self.next_instance);
        self.next_instance += 1;
        id
    }

    pub fn alloc_state(&mut self) -> StateId {
        let id = StateId(self.next_state);
        self.next_state += 1;
        id
    }
}
