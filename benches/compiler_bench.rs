use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use flockc::*;

// KPI-aligned benchmark scenarios.
// All scenarios are valid against the standard catalog.

const SINE_PATCH: &str = r#"
{
    "blocks": [
        {"name": "hz", "type": "constant", "config": {"value": 0.25}},
        {"name": "wave", "type": "osc"},
        {"name": "out", "type": "output"}
    ],
    "wires": [
        {"from": {"block": "hz", "port": "out"}, "to": {"block": "wave", "port": "freq"}},
        {"from": {"block": "wave", "port": "out"}, "to": {"block": "out", "port": "in"}}
    ]
}
"#;

const COUNTER_PATCH: &str = r#"
{
    "blocks": [
        {"name": "one", "type": "constant", "config": {"value": 1.0}},
        {"name": "prev", "type": "delay"},
        {"name": "acc", "type": "add"},
        {"name": "out", "type": "output"}
    ],
    "wires": [
        {"from": {"block": "one", "port": "out"}, "to": {"block": "acc", "port": "a"}},
        {"from": {"block": "prev", "port": "out"}, "to": {"block": "acc", "port": "b"}},
        {"from": {"block": "acc", "port": "out"}, "to": {"block": "prev", "port": "in"}},
        {"from": {"block": "acc", "port": "out"}, "to": {"block": "out", "port": "in"}}
    ]
}
"#;

const SWARM_PATCH: &str = r#"
{
    "blocks": [
        {"name": "dots", "type": "spawn", "config": {"count": 8}},
        {"name": "hz", "type": "constant", "config": {"value": 0.5}},
        {"name": "wave", "type": "osc"},
        {"name": "scaled", "type": "mul"},
        {"name": "total", "type": "reduce", "config": {"op": "sum"}},
        {"name": "out", "type": "output"}
    ],
    "wires": [
        {"from": {"block": "hz", "port": "out"}, "to": {"block": "wave", "port": "freq"}},
        {"from": {"block": "dots", "port": "normalizedIndex"}, "to": {"block": "scaled", "port": "a"}},
        {"from": {"block": "wave", "port": "out"}, "to": {"block": "scaled", "port": "b"}},
        {"from": {"block": "scaled", "port": "out"}, "to": {"block": "total", "port": "in"}},
        {"from": {"block": "total", "port": "out"}, "to": {"block": "out", "port": "in"}}
    ]
}
"#;

const RIBBON_PATCH: &str = r#"
{
    "blocks": [
        {"name": "dots", "type": "spawn", "config": {"count": 16}},
        {"name": "y", "type": "constant", "config": {"value": 0.0}},
        {"name": "z", "type": "constant", "config": {"value": 0.0}},
        {"name": "pos", "type": "pack"},
        {"name": "tan", "type": "pathTangent"},
        {"name": "len", "type": "pathArcLength"},
        {"name": "tangent", "type": "output"},
        {"name": "arc", "type": "output"}
    ],
    "wires": [
        {"from": {"block": "dots", "port": "normalizedIndex"}, "to": {"block": "pos", "port": "x"}},
        {"from": {"block": "y", "port": "out"}, "to": {"block": "pos", "port": "y"}},
        {"from": {"block": "z", "port": "out"}, "to": {"block": "pos", "port": "z"}},
        {"from": {"block": "pos", "port": "out"}, "to": {"block": "tan", "port": "in"}},
        {"from": {"block": "pos", "port": "out"}, "to": {"block": "len", "port": "in"}},
        {"from": {"block": "tan", "port": "out"}, "to": {"block": "tangent", "port": "in"}},
        {"from": {"block": "len", "port": "out"}, "to": {"block": "arc", "port": "in"}}
    ]
}
"#;

fn scenarios() -> [(&'static str, &'static str); 4] {
    [
        ("sine", SINE_PATCH),
        ("counter", COUNTER_PATCH),
        ("swarm", SWARM_PATCH),
        ("ribbon", RIBBON_PATCH),
    ]
}

/// Deep-chain generator used for the compile-scaling KPI.
/// Every stage adds the seed to the running total, so depth grows while
/// fan-in stays flat and every port carries the same unit.
fn generate_chain_patch(n_stages: usize) -> graph::Patch {
    let mut b = graph::PatchBuilder::new().block_with(
        "seed",
        "constant",
        &[("value", graph::ConfigValue::Float(1.0))],
    );

    let mut prev = String::from("seed");
    for s in 0..n_stages {
        let name = format!("s{s}");
        b = b
            .block(&name, "add")
            .wire(&format!("{prev}.out"), &format!("{name}.a"))
            .wire("seed.out", &format!("{name}.b"));
        prev = name;
    }

    b.block("out", "output")
        .wire(&format!("{prev}.out"), "out.in")
        .build()
}

/// Swarm generator used for the frame-throughput KPI: one element domain,
/// a shared oscillator, a per-element scale, and a fold back to a signal.
fn generate_swarm_patch(count: i64) -> graph::Patch {
    graph::PatchBuilder::new()
        .block_with("dots", "spawn", &[("count", graph::ConfigValue::Int(count))])
        .block_with("hz", "constant", &[("value", graph::ConfigValue::Float(0.5))])
        .block("wave", "osc")
        .block("scaled", "mul")
        .block_with(
            "total",
            "reduce",
            &[("op", graph::ConfigValue::Str("sum".to_string()))],
        )
        .block("out", "output")
        .wire("hz.out", "wave.freq")
        .wire("dots.normalizedIndex", "scaled.a")
        .wire("wave.out", "scaled.b")
        .wire("scaled.out", "total.in")
        .wire("total.out", "out.in")
        .build()
}

fn parse_patch(source: &str) -> graph::Patch {
    serde_json::from_str(source).expect("benchmark scenario must parse")
}

fn compile_full(source: &str, registry: &registry::Registry) {
    let patch = parse_patch(source);
    let result = pipeline::compile(
        &patch,
        registry,
        &lower::NullExpressionCompiler,
        pipeline::CompileOptions::default(),
    );
    assert!(!result.has_errors());
    black_box(result.program);
}

// KPI: patch parse latency for representative scenarios.
fn bench_kpi_parse_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/parse_latency");

    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| {
                let patch = parse_patch(black_box(source));
                black_box(&patch);
            });
        });
    }

    group.finish();
}

// KPI: full compile latency (parse -> validate -> lower -> schedule).
fn bench_kpi_full_compile_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/full_compile_latency");
    let registry = catalog::standard();

    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| compile_full(black_box(source), &registry));
        });
    }

    group.finish();
}

// KPI: phase-level latency on a non-trivial patch.
fn bench_kpi_phase_latency(c: &mut Criterion) {
    let registry = catalog::standard();
    let source = SWARM_PATCH;

    // parse
    {
        let mut group = c.benchmark_group("kpi/phase_latency/parse");
        group.bench_function("swarm", |b| {
            b.iter(|| {
                let patch = parse_patch(black_box(source));
                black_box(&patch);
            });
        });
        group.finish();
    }

    // validate (setup: parse)
    {
        let mut group = c.benchmark_group("kpi/phase_latency/validate");
        group.bench_function("swarm", |b| {
            b.iter_batched(
                || parse_patch(source),
                |patch| {
                    let diags = black_box(&patch).validate(&registry);
                    assert!(!diag::has_errors(&diags));
                    black_box(&diags);
                },
                BatchSize::SmallInput,
            );
        });
        group.finish();
    }

    // lower (setup: parse; runs bind + unify + lowering + verification)
    {
        let mut group = c.benchmark_group("kpi/phase_latency/lower");
        group.bench_function("swarm", |b| {
            b.iter_batched(
                || parse_patch(source),
                |patch| {
                    let r = lower::lower_and_verify(
                        black_box(&patch),
                        &registry,
                        &lower::NullExpressionCompiler,
                    );
                    assert!(!r.has_errors());
                    black_box(&r.lowered);
                },
                BatchSize::SmallInput,
            );
        });
        group.finish();
    }

    // schedule (setup: parse + lower; scheduling consumes the lowered patch)
    {
        let mut group = c.benchmark_group("kpi/phase_latency/schedule");
        group.bench_function("swarm", |b| {
            b.iter_batched(
                || {
                    let patch = parse_patch(source);
                    let r = lower::lower_and_verify(
                        &patch,
                        &registry,
                        &lower::NullExpressionCompiler,
                    );
                    assert!(!r.has_errors());
                    r.lowered
                },
                |lowered| {
                    let r = schedule::schedule(black_box(lowered));
                    assert!(!diag::has_errors(&r.diagnostics));
                    black_box(&r.program);
                },
                BatchSize::SmallInput,
            );
        });
        group.finish();
    }
}

// KPI: compile scaling vs chain depth.
fn bench_kpi_compile_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/compile_scaling");
    let registry = catalog::standard();

    for n_stages in [1_usize, 5, 10, 20, 40] {
        let patch = generate_chain_patch(n_stages);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}stages", n_stages)),
            &patch,
            |b, patch| {
                b.iter(|| {
                    let result = pipeline::compile(
                        black_box(patch),
                        &registry,
                        &lower::NullExpressionCompiler,
                        pipeline::CompileOptions::default(),
                    );
                    assert!(!result.has_errors());
                    black_box(&result.program);
                });
            },
        );
    }

    group.finish();
}

// KPI: steady-state frame throughput vs element count.
fn bench_kpi_frame_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/frame_throughput");
    let registry = catalog::standard();

    for count in [8_i64, 64, 256, 1024] {
        let patch = generate_swarm_patch(count);
        let result = pipeline::compile(
            &patch,
            &registry,
            &lower::NullExpressionCompiler,
            pipeline::CompileOptions::default(),
        );
        assert!(!result.has_errors());
        let program = result.program.expect("benchmark scenario must compile");

        let mut driver = exec::FrameDriver::new(program);
        let mut ctx = value::FrameCtx::start();
        group.bench_function(BenchmarkId::from_parameter(format!("{}elems", count)), |b| {
            b.iter(|| {
                let outputs = driver.run_frame(black_box(ctx));
                black_box(&outputs);
                ctx = ctx.advanced(16.0);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_kpi_parse_latency,
    bench_kpi_full_compile_latency,
    bench_kpi_phase_latency,
    bench_kpi_compile_scaling,
    bench_kpi_frame_throughput,
);
criterion_main!(benches);
