// Property-based tests for compiler invariants.
//
// Three categories:
// 1. Generated patches compile with every stage cert passing
// 2. Compilation is deterministic: same patch, same fingerprint, same bytes
// 3. Compiled programs run finite frames through the reference driver
//
// Plus exhaustive checks over the value broadcast rule and kernel algebra.
// Uses proptest with explicit configuration to prevent CI flakiness.

use flockc::catalog;
use flockc::exec::{FrameDriver, OutputData};
use flockc::graph::{ConfigValue, Patch, PatchBuilder};
use flockc::ir::kernels;
use flockc::lower::NullExpressionCompiler;
use flockc::pass::StageCert;
use flockc::pipeline::{compile, CompileOptions, CompileResult};
use flockc::value::{FrameCtx, Value};
use proptest::prelude::*;

// ── Patch generator ─────────────────────────────────────────────────────────

/// Generate a small valid patch: a constant seed pushed through a chain of
/// binary arithmetic stages, optionally scaling a spawned domain that a
/// reduce folds back to one lane. Valid by construction, so every compile
/// failure a property finds is a compiler bug.
fn arb_patch() -> impl Strategy<Value = Patch> {
    // Bounded operands keep three chained muls comfortably finite.
    let bounded = -1000.0f64..1000.0;
    (
        bounded.clone(),
        prop::collection::vec(
            (prop_oneof![Just("add"), Just("sub"), Just("mul")], bounded),
            0..=3,
        ),
        prop::option::of(1i64..=16),
    )
        .prop_map(|(seed, stages, field_count)| {
            let mut builder = PatchBuilder::new().block_with(
                "k",
                "constant",
                &[("value", ConfigValue::Float(seed))],
            );
            let mut prev = String::from("k");
            for (i, (op, operand)) in stages.iter().enumerate() {
                let operand_name = format!("c{i}");
                let stage_name = format!("s{i}");
                builder = builder
                    .block_with(
                        &operand_name,
                        "constant",
                        &[("value", ConfigValue::Float(*operand))],
                    )
                    .block(&stage_name, op)
                    .wire(&format!("{prev}.out"), &format!("{stage_name}.a"))
                    .wire(&format!("{operand_name}.out"), &format!("{stage_name}.b"));
                prev = stage_name;
            }
            let tail = match field_count {
                Some(count) => {
                    builder = builder
                        .block_with("dots", "spawn", &[("count", ConfigValue::Int(count))])
                        .block("scaled", "mul")
                        .block_with(
                            "total",
                            "reduce",
                            &[("op", ConfigValue::Str("sum".to_string()))],
                        )
                        .wire("dots.normalizedIndex", "scaled.a")
                        .wire(&format!("{prev}.out"), "scaled.b")
                        .wire("scaled.out", "total.in");
                    String::from("total")
                }
                None => prev,
            };
            builder
                .block("out", "output")
                .wire(&format!("{tail}.out"), "out.in")
                .build()
        })
}

fn compile_patch(patch: &Patch) -> CompileResult {
    compile(
        patch,
        &catalog::standard(),
        &NullExpressionCompiler,
        CompileOptions::default(),
    )
}

// ── 1. Stage certs ──────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn generated_patches_compile_clean(patch in arb_patch()) {
        let result = compile_patch(&patch);
        prop_assert!(
            !result.has_errors(),
            "diagnostics for generated patch:\n{:#?}\n{:?}",
            patch,
            result.diagnostics
        );

        let unify = result.unify_cert.expect("unify cert");
        prop_assert!(
            unify.all_pass(),
            "unify obligations: {:?}",
            unify.obligations()
        );
        let lower = result.lower_cert.expect("lower cert");
        prop_assert!(
            lower.all_pass(),
            "lower obligations: {:?}",
            lower.obligations()
        );
        let sched = result.schedule_cert.expect("schedule cert");
        prop_assert!(
            sched.all_pass(),
            "schedule obligations: {:?}",
            sched.obligations()
        );
        prop_assert!(result.program.is_some());
    }
}

// ── 2. Determinism ──────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn compilation_is_deterministic(patch in arb_patch()) {
        let first = compile_patch(&patch).program.expect("first program");
        let second = compile_patch(&patch).program.expect("second program");
        prop_assert_eq!(first.fingerprint(), second.fingerprint());
        prop_assert_eq!(first.to_string(), second.to_string());
    }

// ── 3. Driver runs ──────────────────────────────────────────────────────────

    #[test]
    fn programs_run_three_finite_frames(patch in arb_patch()) {
        let result = compile_patch(&patch);
        prop_assert!(!result.has_errors());
        let mut driver = FrameDriver::new(result.program.expect("program"));
        let mut ctx = FrameCtx::start();
        for _ in 0..3 {
            let frame = driver.run_frame(ctx);
            prop_assert!(
                frame.outputs.contains_key("out"),
                "export missing on frame {}",
                frame.frame
            );
            for (name, data) in &frame.outputs {
                match data {
                    OutputData::Signal(v) => {
                        for lane in 0..v.width() {
                            let x = v.component(lane).expect("lane in range");
                            prop_assert!(x.is_finite(), "output '{}' lane {} is {}", name, lane, x);
                        }
                    }
                    OutputData::Field { data, .. } => {
                        for (i, x) in data.iter().enumerate() {
                            prop_assert!(x.is_finite(), "output '{}' cell {} is {}", name, i, x);
                        }
                    }
                }
            }
            ctx = ctx.advanced(16.0);
        }
    }
}

// ── Broadcast rule (exhaustive) ─────────────────────────────────────────────

#[test]
fn zip_width_follows_the_broadcast_rule() {
    for wa in 1..=4usize {
        for wb in 1..=4usize {
            let out = Value::zero(wa).zip(Value::zero(wb), |x, _| x);
            let expected = if wa == wb {
                wa
            } else if wa == 1 {
                wb
            } else if wb == 1 {
                wa
            } else {
                // Mixed vector widths keep the left operand's shape.
                wa
            };
            assert_eq!(out.width(), expected, "zip width for ({wa}, {wb})");
        }
    }
}

// ── Kernel algebra ──────────────────────────────────────────────────────────

fn scalar(v: Value) -> f64 {
    match v {
        Value::Scalar(x) => x,
        other => panic!("expected a scalar, got {other:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn kernel_algebra_holds(a in -1e6f64..1e6, b in -1e6f64..1e6, t in 0.0f64..=1.0) {
        let va = Value::Scalar(a);
        let vb = Value::Scalar(b);

        // add and mul commute exactly
        prop_assert_eq!((kernels::ADD.eval)(&[va, vb]), (kernels::ADD.eval)(&[vb, va]));
        prop_assert_eq!((kernels::MUL.eval)(&[va, vb]), (kernels::MUL.eval)(&[vb, va]));

        // min never exceeds max
        let lo = scalar((kernels::MIN.eval)(&[va, vb]));
        let hi = scalar((kernels::MAX.eval)(&[va, vb]));
        prop_assert!(lo <= hi);

        // select picks whole values by threshold
        prop_assert_eq!((kernels::SELECT.eval)(&[Value::Scalar(0.0), va, vb]), va);
        prop_assert_eq!((kernels::SELECT.eval)(&[Value::Scalar(1.0), va, vb]), vb);

        // mix starts at a, lands within rounding of b, and stays inside
        // the endpoints for t in [0, 1]
        prop_assert_eq!((kernels::MIX.eval)(&[va, vb, Value::Scalar(0.0)]), va);
        let tol = 1e-9 * b.abs().max(1.0);
        let at_one = scalar((kernels::MIX.eval)(&[va, vb, Value::Scalar(1.0)]));
        prop_assert!((at_one - b).abs() <= tol, "mix(a, b, 1) = {at_one}, b = {b}");
        let between = scalar((kernels::MIX.eval)(&[va, vb, Value::Scalar(t)]));
        let slack = 1e-9 * (a.abs() + b.abs()).max(1.0);
        prop_assert!(
            between >= lo - slack && between <= hi + slack,
            "mix(a, b, {t}) = {between} outside [{lo}, {hi}]"
        );
    }
}
