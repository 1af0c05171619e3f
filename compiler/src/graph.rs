// graph.rs — Patch document: blocks, wires, and structural validation
//
// A patch is the compiler's input: a list of block instantiations and
// the wires between their ports. Block order in the document is load
// bearing; `BlockId` is the declaration index and every downstream
// tie-break keys on it.
//
// Preconditions: none (deserialized straight from JSON).
// Postconditions: `validate` reports every structural defect it can
//   see; it never mutates the patch.
// Failure modes: none (validation returns diagnostics, not errors).
// Side effects: none.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diag::{codes, Diagnostic, Origin};
use crate::id::BlockId;
use crate::registry::Registry;

// ── Config values ────────────────────────────────────────────────────────

/// A block configuration value as written in the patch document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    FloatList(Vec<f64>),
}

impl ConfigValue {
    /// Numeric read: accepts both `Int` and `Float` spellings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Int(v) => Some(*v as f64),
            ConfigValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_list(&self) -> Option<&[f64]> {
        match self {
            ConfigValue::FloatList(v) => Some(v),
            _ => None,
        }
    }
}

// ── Document structure ───────────────────────────────────────────────────

/// One block instantiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockInst {
    /// Patch-unique instance name; wires refer to it.
    pub name: String,
    /// Registry key of the block definition.
    #[serde(rename = "type")]
    pub block_type: String,
    /// Keys are sorted so serialization is stable.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, ConfigValue>,
}

/// One endpoint of a wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRef {
    pub block: String,
    pub port: String,
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.block, self.port)
    }
}

/// A directed connection from an output port to an input port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wire {
    pub from: PortRef,
    pub to: PortRef,
}

/// The whole patch document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Patch {
    pub blocks: Vec<BlockInst>,
    #[serde(default)]
    pub wires: Vec<Wire>,
}

impl Patch {
    /// Declaration index of a block, by instance name.
    pub fn block_index(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.name == name)
            .map(|i| BlockId(i as u32))
    }

    pub fn block(&self, id: BlockId) -> &BlockInst {
        &self.blocks[id.0 as usize]
    }

    /// Name index for wire resolution. First declaration wins; duplicates
    /// are reported by `validate`.
    pub fn name_index(&self) -> HashMap<&str, BlockId> {
        let mut index = HashMap::new();
        for (i, b) in self.blocks.iter().enumerate() {
            index.entry(b.name.as_str()).or_insert(BlockId(i as u32));
        }
        index
    }

    /// Structural validation: name uniqueness, wire endpoint existence,
    /// port existence (when the block type is known), input fan-in, and
    /// unused-output warnings. Unknown block types are left for lowering
    /// to report so the diagnostic lands once, not per wire.
    pub fn validate(&self, registry: &Registry) -> Vec<Diagnostic> {
        let mut diags = Vec::new();

        let mut seen: HashMap<&str, BlockId> = HashMap::new();
        for (i, b) in self.blocks.iter().enumerate() {
            let id = BlockId(i as u32);
            if let Some(first) = seen.get(b.name.as_str()) {
                diags.push(
                    Diagnostic::error(
                        codes::DUPLICATE_BLOCK_NAME,
                        Origin::Block(id),
                        format!("block name '{}' is already in use", b.name),
                    )
                    .with_related(Origin::Block(*first), "first declared here"),
                );
            } else {
                seen.insert(b.name.as_str(), id);
            }
        }

        let index = self.name_index();
        let mut wired_inputs: HashMap<(BlockId, &str), &Wire> = HashMap::new();
        let mut has_outgoing: Vec<bool> = vec![false; self.blocks.len()];

        for wire in &self.wires {
            let from_id = index.get(wire.from.block.as_str()).copied();
            let to_id = index.get(wire.to.block.as_str()).copied();

            if from_id.is_none() {
                diags.push(Diagnostic::error(
                    codes::UNKNOWN_WIRE_BLOCK,
                    Origin::Patch,
                    format!("wire source '{}' names a block that does not exist", wire.from),
                ));
            }
            if to_id.is_none() {
                diags.push(Diagnostic::error(
                    codes::UNKNOWN_WIRE_BLOCK,
                    Origin::Patch,
                    format!("wire target '{}' names a block that does not exist", wire.to),
                ));
            }

            if let Some(from_id) = from_id {
                has_outgoing[from_id.0 as usize] = true;
                if let Some(def) = registry.lookup(&self.block(from_id).block_type) {
                    if !def.signature.outputs.iter().any(|p| p.name == wire.from.port) {
                        diags.push(
                            Diagnostic::error(
                                codes::UNKNOWN_WIRE_PORT,
                                Origin::port(from_id, wire.from.port.clone()),
                                format!(
                                    "block type '{}' has no output port '{}'",
                                    def.name, wire.from.port
                                ),
                            )
                            .with_hint(format!(
                                "available outputs: {}",
                                port_names(def.signature.outputs.iter().map(|p| p.name))
                            )),
                        );
                    }
                }
            }

            if let Some(to_id) = to_id {
                if let Some(def) = registry.lookup(&self.block(to_id).block_type) {
                    if !def.signature.inputs.iter().any(|p| p.name == wire.to.port) {
                        diags.push(
                            Diagnostic::error(
                                codes::UNKNOWN_WIRE_PORT,
                                Origin::port(to_id, wire.to.port.clone()),
                                format!(
                                    "block type '{}' has no input port '{}'",
                                    def.name, wire.to.port
                                ),
                            )
                            .with_hint(format!(
                                "available inputs: {}",
                                port_names(def.signature.inputs.iter().map(|p| p.name))
                            )),
                        );
                    }
                }
                if let Some(earlier) = wired_inputs.insert((to_id, wire.to.port.as_str()), wire) {
                    let earlier_from = index.get(earlier.from.block.as_str()).copied();
                    let mut d = Diagnostic::error(
                        codes::INPUT_WIRED_TWICE,
                        Origin::port(to_id, wire.to.port.clone()),
                        format!("input '{}' is wired more than once", wire.to),
                    );
                    if let Some(earlier_from) = earlier_from {
                        d = d.with_related(Origin::Block(earlier_from), "earlier wire starts here");
                    }
                    diags.push(d);
                }
            }
        }

        for (i, b) in self.blocks.iter().enumerate() {
            if has_outgoing[i] {
                continue;
            }
            if let Some(def) = registry.lookup(&b.block_type) {
                if !def.signature.outputs.is_empty() {
                    diags.push(Diagnostic::warning(
                        codes::UNUSED_BLOCK,
                        Origin::Block(BlockId(i as u32)),
                        format!("block '{}' produces outputs nothing consumes", b.name),
                    ));
                }
            }
        }

        diags
    }
}

fn port_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let list: Vec<&str> = names.collect();
    if list.is_empty() {
        "(none)".to_string()
    } else {
        list.join(", ")
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Fluent construction for demo patches and tests.
///
/// Wire endpoints use the `"block.port"` spelling; the builder panics on
/// a malformed endpoint since these are always literals in source.
#[derive(Debug, Default)]
pub struct PatchBuilder {
    patch: Patch,
}

impl PatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(mut self, name: &str, block_type: &str) -> Self {
        self.patch.blocks.push(BlockInst {
            name: name.to_string(),
            block_type: block_type.to_string(),
            config: BTreeMap::new(),
        });
        self
    }

    pub fn block_with(
        mut self,
        name: &str,
        block_type: &str,
        config: &[(&str, ConfigValue)],
    ) -> Self {
        self.patch.blocks.push(BlockInst {
            name: name.to_string(),
            block_type: block_type.to_string(),
            config: config
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
        self
    }

    pub fn wire(mut self, from: &str, to: &str) -> Self {
        self.patch.wires.push(Wire {
            from: parse_port_ref(from),
            to: parse_port_ref(to),
        });
        self
    }

    pub fn build(self) -> Patch {
        self.patch
    }
}

fn parse_port_ref(s: &str) -> PortRef {
    match s.split_once('.') {
        Some((block, port)) if !block.is_empty() && !port.is_empty() => PortRef {
            block: block.to_string(),
            port: port.to_string(),
        },
        _ => panic!("wire endpoint '{s}' must be spelled 'block.port'"),
    }
}
