// pipeline.rs — Pass orchestration from patch document to compiled program
//
// Runs the minimal set of passes for a given terminal PassId, accumulates
// diagnostics across passes, and stamps the result with provenance for
// cache-key use.
//
// Preconditions: a parsed Patch and a populated Registry.
// Postconditions: every artifact up to the terminal pass is populated, or
//   diagnostics explain why the run stopped early.
// Failure modes: any pass emitting error-level diagnostics ends the run;
//   artifacts produced before the failing pass stay in the result.
// Side effects: calls on_pass_complete after each pass for immediate
//   display; verbose timing goes to stderr.

use std::time::Instant;

use crate::diag::{codes, has_errors, Diagnostic, Origin};
use crate::graph::Patch;
use crate::lower::{lower_and_verify, ExpressionCompiler, LowerCert, LowerResult};
use crate::pass::{descriptor, required_passes, PassId, StageCert};
use crate::registry::Registry;
use crate::schedule::{schedule, CompiledProgram, ScheduleCert};
use crate::subst::UnifyCert;

// ── Provenance ───────────────────────────────────────────────────────────

/// Provenance metadata for hermetic builds and cache-key use.
///
/// `patch_hash`: SHA-256 of the patch document's JSON serialization.
/// `registry_fingerprint`: SHA-256 of `Registry::canonical_json()`.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub patch_hash: [u8; 32],
    pub registry_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the patch hash (64 characters).
    pub fn patch_hash_hex(&self) -> String {
        bytes_to_hex(&self.patch_hash)
    }

    /// Hex string of the registry fingerprint (64 characters).
    pub fn registry_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.registry_fingerprint)
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"patch_hash\": \"{}\",\n  \"registry_fingerprint\": \"{}\",\n  \"manifest_schema_version\": 1,\n  \"compiler_version\": \"{}\"\n}}\n",
            self.patch_hash_hex(),
            self.registry_fingerprint_hex(),
            self.compiler_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

/// Compute provenance from the patch document and registry.
///
/// Uses SHA-256 for both hashes. The registry fingerprint is computed from
/// `Registry::canonical_json()` (compact JSON, no whitespace) to ensure
/// stability independent of display formatting.
pub fn compute_provenance(patch: &Patch, registry: &Registry) -> Provenance {
    use sha2::{Digest, Sha256};

    let patch_hash = {
        let doc = serde_json::to_string(patch).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(doc.as_bytes());
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    };

    let registry_fingerprint = {
        let canonical = registry.canonical_json();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    };

    Provenance {
        patch_hash,
        registry_fingerprint,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Options and result ───────────────────────────────────────────────────

/// What to run and how loudly.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Last pass to execute.
    pub terminal: PassId,
    /// Per-pass timing on stderr.
    pub verbose: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            terminal: PassId::Schedule,
            verbose: false,
        }
    }
}

/// Everything one compilation run produced.
pub struct CompileResult {
    /// Present once scheduling ran without errors.
    pub program: Option<CompiledProgram>,
    /// Resolved port types, one line per port. Present once lowering ran.
    pub types_dump: Option<String>,
    pub unify_cert: Option<UnifyCert>,
    pub lower_cert: Option<LowerCert>,
    pub schedule_cert: Option<ScheduleCert>,
    pub provenance: Provenance,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileResult {
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

// ── Per-pass post-processing ─────────────────────────────────────────────

struct PassFailed;

/// Per-pass sequence: callback, accumulate, verbose timing, error check.
fn finish_pass(
    all_diags: &mut Vec<Diagnostic>,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: std::time::Duration,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PassFailed> {
    on_pass_complete(pass_id, &diags);
    let failed = has_errors(&diags);
    all_diags.extend(diags);
    if verbose {
        eprintln!(
            "flockc: {} complete, {:.1}ms",
            descriptor(pass_id).name,
            elapsed.as_secs_f64() * 1000.0
        );
    }
    if failed {
        return Err(PassFailed);
    }
    Ok(())
}

// ── Pipeline runner ──────────────────────────────────────────────────────

/// Run the pipeline with no per-pass callback.
pub fn compile(
    patch: &Patch,
    registry: &Registry,
    expr_compiler: &dyn ExpressionCompiler,
    options: CompileOptions,
) -> CompileResult {
    compile_with(patch, registry, expr_compiler, options, |_, _| {})
}

/// Run the minimal set of passes to produce `options.terminal`.
///
/// Bind and Unify execute inside the lowering engine; requesting either as
/// the terminal runs lowering in full and reports it under `PassId::Lower`.
pub fn compile_with(
    patch: &Patch,
    registry: &Registry,
    expr_compiler: &dyn ExpressionCompiler,
    options: CompileOptions,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> CompileResult {
    let passes = required_passes(options.terminal);
    let mut result = CompileResult {
        program: None,
        types_dump: None,
        unify_cert: None,
        lower_cert: None,
        schedule_cert: None,
        provenance: compute_provenance(patch, registry),
        diagnostics: Vec::new(),
    };

    let t = Instant::now();
    let diags = patch.validate(registry);
    if finish_pass(
        &mut result.diagnostics,
        PassId::Validate,
        diags,
        t.elapsed(),
        options.verbose,
        &mut on_pass_complete,
    )
    .is_err()
    {
        return result;
    }

    let needs_lowering = passes.iter().any(|p| {
        matches!(
            p,
            PassId::Bind | PassId::Unify | PassId::Lower | PassId::Schedule
        )
    });
    if !needs_lowering {
        return result;
    }

    let t = Instant::now();
    let LowerResult {
        lowered,
        unify_cert,
        cert,
        diagnostics,
    } = lower_and_verify(patch, registry, expr_compiler);
    let mut diags = diagnostics;
    if !unify_cert.all_pass() {
        let failed: Vec<&str> = unify_cert
            .obligations()
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| *name)
            .collect();
        diags.push(Diagnostic::error(
            codes::UNIFY_CERT_FAILED,
            Origin::Patch,
            format!("unification verification failed: {}", failed.join(", ")),
        ));
    }
    result.types_dump = Some(lowered.types_dump(patch));
    result.unify_cert = Some(unify_cert);
    result.lower_cert = Some(cert);
    if finish_pass(
        &mut result.diagnostics,
        PassId::Lower,
        diags,
        t.elapsed(),
        options.verbose,
        &mut on_pass_complete,
    )
    .is_err()
    {
        return result;
    }

    if !passes.contains(&PassId::Schedule) {
        return result;
    }

    let t = Instant::now();
    let sched = schedule(lowered);
    result.schedule_cert = Some(sched.cert);
    if finish_pass(
        &mut result.diagnostics,
        PassId::Schedule,
        sched.diagnostics,
        t.elapsed(),
        options.verbose,
        &mut on_pass_complete,
    )
    .is_err()
    {
        return result;
    }
    result.program = Some(sched.program);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::graph::PatchBuilder;
    use crate::lower::NullExpressionCompiler;

    fn sine_patch() -> Patch {
        PatchBuilder::new()
            .block("hz", "constant")
            .block("wave", "osc")
            .block("out", "output")
            .wire("hz.out", "wave.freq")
            .wire("wave.out", "out.in")
            .build()
    }

    fn run(patch: &Patch, options: CompileOptions) -> CompileResult {
        compile(
            patch,
            &catalog::standard(),
            &NullExpressionCompiler,
            options,
        )
    }

    #[test]
    fn full_chain_produces_a_program() {
        let result = run(&sine_patch(), CompileOptions::default());
        assert!(!result.has_errors(), "diagnostics: {:?}", result.diagnostics);
        let program = result.program.expect("program");
        assert!(!program.steps.is_empty());
        assert!(result.types_dump.is_some());
        assert!(result.unify_cert.expect("unify cert").all_pass());
        assert!(result.lower_cert.expect("lower cert").all_pass());
        assert!(result.schedule_cert.expect("schedule cert").all_pass());
    }

    #[test]
    fn type_error_stops_before_schedule() {
        // Milliseconds wired into a Hertz port.
        let patch = PatchBuilder::new()
            .block("t", "time")
            .block("wave", "osc")
            .block("out", "output")
            .wire("t.out", "wave.freq")
            .wire("wave.out", "out.in")
            .build();
        let result = run(&patch, CompileOptions::default());
        assert!(result.has_errors());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == Some(codes::TYPE_CONFLICT)));
        assert!(result.program.is_none());
        assert!(result.types_dump.is_some());
        assert!(result.schedule_cert.is_none());
    }

    #[test]
    fn validate_failure_skips_lowering() {
        let patch = PatchBuilder::new()
            .block("out", "output")
            .wire("ghost.out", "out.in")
            .build();
        let result = run(&patch, CompileOptions::default());
        assert!(result.has_errors());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == Some(codes::UNKNOWN_WIRE_BLOCK)));
        assert!(result.types_dump.is_none());
        assert!(result.unify_cert.is_none());
        assert!(result.program.is_none());
    }

    #[test]
    fn terminal_lower_stops_after_lowering() {
        let options = CompileOptions {
            terminal: PassId::Lower,
            ..CompileOptions::default()
        };
        let result = run(&sine_patch(), options);
        assert!(!result.has_errors(), "diagnostics: {:?}", result.diagnostics);
        assert!(result.types_dump.is_some());
        assert!(result.lower_cert.is_some());
        assert!(result.schedule_cert.is_none());
        assert!(result.program.is_none());
    }

    #[test]
    fn provenance_is_stable() {
        let registry = catalog::standard();
        let patch = sine_patch();
        let a = compute_provenance(&patch, &registry);
        let b = compute_provenance(&patch, &registry);
        assert_eq!(a.patch_hash, b.patch_hash);
        assert_eq!(a.registry_fingerprint, b.registry_fingerprint);

        let other = PatchBuilder::new().block("solo", "constant").build();
        let c = compute_provenance(&other, &registry);
        assert_ne!(a.patch_hash, c.patch_hash);
        assert_eq!(a.registry_fingerprint, c.registry_fingerprint);

        let json = a.to_json();
        assert!(json.contains("\"manifest_schema_version\": 1"));
        assert!(json.contains(&a.patch_hash_hex()));
    }

    #[test]
    fn callback_sees_passes_in_order() {
        let mut seen = Vec::new();
        compile_with(
            &sine_patch(),
            &catalog::standard(),
            &NullExpressionCompiler,
            CompileOptions::default(),
            |pass, _| seen.push(pass),
        );
        assert_eq!(seen, vec![PassId::Validate, PassId::Lower, PassId::Schedule]);
    }
}
