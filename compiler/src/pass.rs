// pass.rs — Pass descriptors: metadata, dependency resolution, artifact ids
//
// Declares the compiler's 5 semantic stages, their dependency edges, and the
// artifacts they produce. The pipeline runner uses this to compute the
// minimal stage subset for each --emit target. Stages that verify proof
// obligations hand back a cert implementing [`StageCert`].

use std::collections::HashSet;

// ── Pass and artifact identifiers ────────────────────────────────────────

/// Identifies each compiler stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Validate,
    Bind,
    Unify,
    Lower,
    Schedule,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type in
/// the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Validated,    // Patch, structurally checked
    Sigs,         // SigInstance per block
    Subst,        // Substitution
    UnifyCert,    // UnifyCert
    Lowered,      // LoweredPatch
    LowerCert,    // LowerCert
    Program,      // CompiledProgram
    ScheduleCert, // ScheduleCert
}

// ── Stage certs ──────────────────────────────────────────────────────────

/// Evidence that one stage's proof obligations were checked.
///
/// Verification runs inside the stage that owns the obligations; the cert
/// records the verdicts so later stages and tools can gate on them without
/// re-deriving anything.
pub trait StageCert {
    fn all_pass(&self) -> bool;
    /// Obligation labels with their verdicts, in declaration order.
    fn obligations(&self) -> Vec<(&'static str, bool)>;
}

// ── Pass descriptor ──────────────────────────────────────────────────────

/// Static metadata about a compiler stage.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Stage dependencies (stages whose outputs this stage consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this stage produces.
    pub outputs: &'static [ArtifactId],
    /// Describes what invalidates this stage's output.
    pub invalidation_key: &'static str,
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given stage.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Validate => PassDescriptor {
            name: "validate",
            inputs: &[],
            outputs: &[ArtifactId::Validated],
            invalidation_key: "patch",
            invariants: "block names unique, wires reference declared endpoints",
        },
        PassId::Bind => PassDescriptor {
            name: "bind",
            inputs: &[PassId::Validate],
            outputs: &[ArtifactId::Sigs],
            invalidation_key: "patch blocks + registry fingerprint",
            invariants: "every known block type bound to fresh axis variables",
        },
        PassId::Unify => PassDescriptor {
            name: "unify",
            inputs: &[PassId::Bind],
            outputs: &[ArtifactId::Subst, ArtifactId::UnifyCert],
            invalidation_key: "patch wires + sigs",
            invariants: "U1-U2 verified: bindings append-only, groups consistent",
        },
        PassId::Lower => PassDescriptor {
            name: "lower",
            inputs: &[PassId::Unify],
            outputs: &[ArtifactId::Lowered, ArtifactId::LowerCert],
            invalidation_key: "sigs + subst + registry fingerprint",
            invariants: "L1-L4 verified: outputs complete, concrete, acyclic",
        },
        PassId::Schedule => PassDescriptor {
            name: "schedule",
            inputs: &[PassId::Lower],
            outputs: &[ArtifactId::Program, ArtifactId::ScheduleCert],
            invalidation_key: "lowered tables + exports",
            invariants: "S1-S3 verified: complete, ordered, state writes last",
        },
    }
}

// ── Dependency resolution ────────────────────────────────────────────────

/// All 5 stage ids in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 5] = [
    PassId::Validate,
    PassId::Bind,
    PassId::Unify,
    PassId::Lower,
    PassId::Schedule,
];

/// Compute the minimal ordered set of stages needed to produce `terminal`.
/// Returns stages in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_validate_is_minimal() {
        assert_eq!(required_passes(PassId::Validate), vec![PassId::Validate]);
    }

    #[test]
    fn required_passes_lower_stops_before_schedule() {
        let passes = required_passes(PassId::Lower);
        assert_eq!(
            passes,
            vec![PassId::Validate, PassId::Bind, PassId::Unify, PassId::Lower]
        );
        assert!(!passes.contains(&PassId::Schedule));
    }

    #[test]
    fn required_passes_schedule_includes_all() {
        let passes = required_passes(PassId::Schedule);
        assert_eq!(passes.len(), 5);
        assert_eq!(passes, ALL_PASSES.to_vec());
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "stage {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        // Every dependency must come before its dependent in the
        // topological order required_passes computes.
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            for dep in desc.inputs {
                let order = required_passes(*pass);
                let dep_pos = order.iter().position(|p| p == dep);
                let self_pos = order.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
