// Handoff tests: compiled programs on one side, a continuity session on
// the other.
//
// Exercises the two workflows a live host performs: resizing a domain
// mid-run, and compiling an edited patch then swapping programs — both
// without a visible jump in the outputs.

use flockc::catalog;
use flockc::continuity::{ContinuitySession, MappingStrategy, SlewParams};
use flockc::exec::{FrameDriver, FrameOutputs, OutputData};
use flockc::graph::{ConfigValue, Patch, PatchBuilder};
use flockc::id::InstanceId;
use flockc::lower::NullExpressionCompiler;
use flockc::pipeline::{compile, CompileOptions};
use flockc::value::FrameCtx;

fn ramp_patch(count: i64, scale: f64) -> Patch {
    PatchBuilder::new()
        .block_with("dots", "spawn", &[("count", ConfigValue::Int(count))])
        .block_with("gain", "constant", &[("value", ConfigValue::Float(scale))])
        .block("scaled", "mul")
        .block("pts", "output")
        .wire("dots.normalizedIndex", "scaled.a")
        .wire("gain.out", "scaled.b")
        .wire("scaled.out", "pts.in")
        .build()
}

fn driver(patch: &Patch) -> FrameDriver {
    let result = compile(
        patch,
        &catalog::standard(),
        &NullExpressionCompiler,
        CompileOptions::default(),
    );
    assert!(!result.has_errors(), "diagnostics: {:?}", result.diagnostics);
    FrameDriver::new(result.program.expect("program"))
}

fn field_data(outputs: &FrameOutputs, name: &str) -> Vec<f64> {
    match &outputs.outputs[name] {
        OutputData::Field { data, .. } => data.clone(),
        other => panic!("expected a field for '{name}', got {other:?}"),
    }
}

fn assert_close(got: &[f64], want: &[f64]) {
    assert_eq!(got.len(), want.len(), "got {got:?}, want {want:?}");
    for (g, w) in got.iter().zip(want) {
        assert!((g - w).abs() < 1e-12, "got {got:?}, want {want:?}");
    }
}

#[test]
fn live_resizes_remap_without_a_swap() {
    let mut session = ContinuitySession::new(MappingStrategy::ById, SlewParams::default());
    let mut driver = driver(&ramp_patch(3, 10.0));

    let mut ctx = FrameCtx::start();
    let shown = session.note_frame(&driver.run_frame(ctx), 0.0);
    assert_eq!(field_data(&shown, "pts"), vec![0.0, 5.0, 10.0]);

    // Grow the domain mid-run. The driver keeps surviving identities, so
    // the session maps them and only the fresh elements snap to the new
    // ramp [0, 2.5, 5, 7.5, 10].
    driver.set_count(InstanceId(0), 5);
    ctx = ctx.advanced(16.0);
    let shown = session.note_frame(&driver.run_frame(ctx), 0.0);
    assert_close(&field_data(&shown, "pts"), &[0.0, 5.0, 10.0, 7.5, 10.0]);

    let stats = session.stats();
    assert_eq!(stats.remaps, 1);
    assert_eq!(stats.mapped, 3);
    assert_eq!(stats.unmapped, 2);
}

#[test]
fn survivors_hand_off_smoothly_across_a_swap() {
    let mut session = ContinuitySession::new(MappingStrategy::ById, SlewParams::default());

    // Old program: three elements ramping to 10.
    let mut old = driver(&ramp_patch(3, 10.0));
    let shown = session.note_frame(&old.run_frame(FrameCtx::start()), 0.0);
    assert_eq!(field_data(&shown, "pts"), vec![0.0, 5.0, 10.0]);

    // Swap to five elements ramping to 40. Both drivers number elements
    // from zero, so the first three identities survive the swap.
    let mut next = driver(&ramp_patch(5, 40.0));
    let mut ctx = FrameCtx::start();
    let first = next.run_frame(ctx);
    session.retarget(&first);

    // Right after the swap the survivors still show their old values;
    // the two fresh elements snap to the new program.
    let shown = session.note_frame(&first, 0.0);
    assert_close(&field_data(&shown, "pts"), &[0.0, 5.0, 10.0, 30.0, 40.0]);

    let stats = session.stats();
    assert_eq!(stats.remaps, 1);
    assert_eq!(stats.mapped, 3);
    assert_eq!(stats.unmapped, 2);

    // Well past τ the blend retires and the new values pass through
    // untouched.
    let mut shown = shown;
    for _ in 0..80 {
        ctx = ctx.advanced(16.0);
        let frame = next.run_frame(ctx);
        shown = session.note_frame(&frame, 16.0);
    }
    assert_eq!(
        field_data(&shown, "pts"),
        vec![0.0, 10.0, 20.0, 30.0, 40.0]
    );
}

#[test]
fn constant_edits_blend_under_identity_mapping() {
    let mut session = ContinuitySession::new(MappingStrategy::Identity, SlewParams::default());

    let mut old = driver(&ramp_patch(5, 10.0));
    let before = session.note_frame(&old.run_frame(FrameCtx::start()), 0.0);
    let before = field_data(&before, "pts");

    // Same topology, louder gain.
    let mut next = driver(&ramp_patch(5, 30.0));
    let first = next.run_frame(FrameCtx::start());
    session.retarget(&first);

    // Every element keeps its old value at the instant of the swap.
    let shown = session.note_frame(&first, 0.0);
    assert_close(&field_data(&shown, "pts"), &before);
    assert_eq!(session.stats().mapped, 5);
    assert_eq!(session.stats().unmapped, 0);

    // One τ later the displayed ramp sits strictly between old and new.
    let later = session.note_frame(&next.run_frame(FrameCtx::start().advanced(120.0)), 120.0);
    let later = field_data(&later, "pts");
    for (i, shown) in later.iter().enumerate().skip(1) {
        let old_v = before[i];
        let new_v = (i as f64 / 4.0) * 30.0;
        assert!(
            *shown > old_v && *shown < new_v,
            "element {i} should blend between {old_v} and {new_v}, got {shown}"
        );
    }
}
