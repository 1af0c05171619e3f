// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all compiler phases.
// A patch has no source text, so diagnostics point at graph locations
// (a block, a port, a wire) instead of byte spans.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::id::BlockId;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`, `W0001`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable code constants, grouped by the phase that emits them.
pub mod codes {
    use super::DiagCode;

    // Patch structure
    pub const DUPLICATE_BLOCK_NAME: DiagCode = DiagCode("E0001");
    pub const UNKNOWN_WIRE_BLOCK: DiagCode = DiagCode("E0002");
    pub const UNKNOWN_WIRE_PORT: DiagCode = DiagCode("E0003");
    pub const INPUT_WIRED_TWICE: DiagCode = DiagCode("E0004");

    // Types
    pub const TYPE_CONFLICT: DiagCode = DiagCode("E0101");
    pub const UNRESOLVED_AXIS_VAR: DiagCode = DiagCode("E0102");

    // Cardinality
    pub const CARDINALITY_MISMATCH: DiagCode = DiagCode("E0201");
    pub const BROADCAST_EXPR_REQUIRED: DiagCode = DiagCode("E0202");

    // IR building
    pub const UNKNOWN_BLOCK_TYPE: DiagCode = DiagCode("E0301");
    pub const MISSING_REQUIRED_INPUT: DiagCode = DiagCode("E0302");
    pub const INSTANCE_CONTEXT_MISSING: DiagCode = DiagCode("E0303");
    pub const DOMAIN_MISMATCH: DiagCode = DiagCode("E0304");
    pub const BAD_BLOCK_CONFIG: DiagCode = DiagCode("E0305");

    // Scheduling
    pub const UNSCHEDULABLE_CYCLE: DiagCode = DiagCode("E0401");

    // Collaborators
    pub const EXPR_COMPILE_FAILED: DiagCode = DiagCode("E0501");

    // Pass verification
    pub const UNIFY_CERT_FAILED: DiagCode = DiagCode("E0601");
    pub const LOWER_CERT_FAILED: DiagCode = DiagCode("E0602");
    pub const SCHEDULE_CERT_FAILED: DiagCode = DiagCode("E0603");

    // Warnings
    pub const UNUSED_BLOCK: DiagCode = DiagCode("W0001");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Graph origin ─────────────────────────────────────────────────────────

/// Where in the patch a diagnostic points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The patch as a whole (no better anchor).
    Patch,
    /// One block instantiation.
    Block(BlockId),
    /// One port of one block.
    Port { block: BlockId, port: String },
    /// The wire between two ports.
    Wire { from: BlockId, to: BlockId },
}

impl Origin {
    pub fn port(block: BlockId, port: impl Into<String>) -> Origin {
        Origin::Port {
            block,
            port: port.into(),
        }
    }

    /// The block this origin is anchored to, when there is one.
    pub fn block(&self) -> Option<BlockId> {
        match self {
            Origin::Patch => None,
            Origin::Block(b) => Some(*b),
            Origin::Port { block, .. } => Some(*block),
            Origin::Wire { to, .. } => Some(*to),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Patch => write!(f, "patch"),
            Origin::Block(b) => write!(f, "block #{}", b.0),
            Origin::Port { block, port } => write!(f, "block #{} port '{}'", block.0, port),
            Origin::Wire { from, to } => write!(f, "wire #{} -> #{}", from.0, to.0),
        }
    }
}

// ── Related origin ───────────────────────────────────────────────────────

/// A secondary graph location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedOrigin {
    pub origin: Origin,
    pub label: String,
}

// ── Cause record ─────────────────────────────────────────────────────────

/// One link in a cause chain explaining a propagated constraint failure.
#[derive(Debug, Clone)]
pub struct CauseRecord {
    pub message: String,
    pub origin: Option<Origin>,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub origin: Origin,
    pub message: String,
    pub hint: Option<String>,
    pub related: Vec<RelatedOrigin>,
    pub cause_chain: Vec<CauseRecord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, related origins, or causes.
    pub fn new(level: DiagLevel, origin: Origin, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            origin,
            message: message.into(),
            hint: None,
            related: Vec::new(),
            cause_chain: Vec::new(),
        }
    }

    /// Shorthand for an error diagnostic carrying a code.
    pub fn error(code: DiagCode, origin: Origin, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, origin, message).with_code(code)
    }

    /// Shorthand for a warning diagnostic carrying a code.
    pub fn warning(code: DiagCode, origin: Origin, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, origin, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related graph location.
    pub fn with_related(mut self, origin: Origin, label: impl Into<String>) -> Self {
        self.related.push(RelatedOrigin {
            origin,
            label: label.into(),
        });
        self
    }

    /// Attach a cause record to the chain.
    pub fn with_cause(mut self, message: impl Into<String>, origin: Option<Origin>) -> Self {
        self.cause_chain.push(CauseRecord {
            message: message.into(),
            origin,
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {} ({})", level, code, self.message, self.origin)?;
        } else {
            write!(f, "{}: {} ({})", level, self.message, self.origin)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True if any diagnostic in the slice is an error.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, Origin::Patch, "something failed");
        assert_eq!(format!("{d}"), "error: something failed (patch)");
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::warning(codes::UNUSED_BLOCK, Origin::Block(BlockId(2)), "unused block");
        assert_eq!(format!("{d}"), "warning[W0001]: unused block (block #2)");
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::error(
            codes::TYPE_CONFLICT,
            Origin::Wire {
                from: BlockId(0),
                to: BlockId(1),
            },
            "cardinality conflict: one vs many",
        )
        .with_hint("insert a broadcast block")
        .with_related(Origin::Block(BlockId(0)), "producer here")
        .with_cause("inferred many from upstream spawn", Some(Origin::Block(BlockId(0))));

        assert_eq!(d.code, Some(codes::TYPE_CONFLICT));
        assert_eq!(d.hint.as_deref(), Some("insert a broadcast block"));
        assert_eq!(d.related.len(), 1);
        assert_eq!(d.cause_chain.len(), 1);
    }

    #[test]
    fn has_errors_ignores_warnings() {
        let w = Diagnostic::warning(codes::UNUSED_BLOCK, Origin::Patch, "unused");
        assert!(!has_errors(&[w.clone()]));
        let e = Diagnostic::error(codes::UNKNOWN_BLOCK_TYPE, Origin::Patch, "unknown");
        assert!(has_errors(&[w, e]));
    }
}
