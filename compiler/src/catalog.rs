// catalog.rs — The standard block library
//
// Sources, arithmetic, element-domain blocks, feedback, and the export
// sink, each as a signature plus a lowering function over LowerCtx. The
// set here is what `flockc` compiles against; hosts may extend the
// registry with their own defs before compiling.
//
// Preconditions: none.
// Postconditions: `standard()` returns a registry whose canonical JSON is
//   byte-stable across processes.
// Failure modes: none at build time; per-block failures surface during
//   lowering as LowerFail values.
// Side effects: none.

use crate::canon::{ConcreteType, Payload, Temporality, Unit};
use crate::cardinality::{BroadcastPolicy, CardinalityMode, LaneCoupling};
use crate::id::ExprId;
use crate::ir::{kernels, IntrinsicChannel, KernelOp, PathDerivKind};
use crate::lower::{LowerCtx, LowerFail, LowerOutput};
use crate::registry::{BlockDef, Registry, TypeTemplate};
use crate::value::Value;

// ── Sources ──────────────────────────────────────────────────────────────

fn lower_constant(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let v = ctx.config_f64_or("value", 0.0)?;
    let ty = ctx.output_ty("out")?;
    let e = ctx.ir.value_const(Value::Scalar(v), ty);
    Ok(LowerOutput::single("out", e))
}

fn lower_vec2(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let x = ctx.config_f64_or("x", 0.0)?;
    let y = ctx.config_f64_or("y", 0.0)?;
    let ty = ctx.output_ty("out")?;
    let e = ctx.ir.value_const(Value::Vec2([x, y]), ty);
    Ok(LowerOutput::single("out", e))
}

fn lower_vec3(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let x = ctx.config_f64_or("x", 0.0)?;
    let y = ctx.config_f64_or("y", 0.0)?;
    let z = ctx.config_f64_or("z", 0.0)?;
    let ty = ctx.output_ty("out")?;
    let e = ctx.ir.value_const(Value::Vec3([x, y, z]), ty);
    Ok(LowerOutput::single("out", e))
}

fn lower_time(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let ty = ctx.output_ty("out")?;
    let e = ctx.ir.value_time(ty);
    Ok(LowerOutput::single("out", e))
}

fn lower_external(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let name = ctx.require_config_str("name")?.to_string();
    let ty = ctx.output_ty("out")?;
    let e = ctx.ir.value_external(&name, ty);
    Ok(LowerOutput::single("out", e))
}

/// sin(TAU * (t/1000 * freq + phase)), zipped per element when any input
/// is a field.
fn lower_osc(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let freq = ctx.wired("freq")?.expr;
    let ty = ctx.output_ty("out")?;
    let ms = ConcreteType::signal(Payload::Float).with_unit(Unit::Milliseconds);
    let t = ExprId::Value(ctx.ir.value_time(ms));
    let phase = match ctx.input("phase").map(|w| w.expr) {
        Some(e) => e,
        None => ExprId::Value(
            ctx.ir
                .value_const(Value::Scalar(0.0), ConcreteType::signal(Payload::Float)),
        ),
    };
    let e = ctx.kernel_auto(kernels::SINE_OSC, &[t, freq, phase], ty)?;
    Ok(LowerOutput::single("out", e))
}

// ── Arithmetic ───────────────────────────────────────────────────────────

fn lower_zip(ctx: &mut LowerCtx<'_>, op: KernelOp) -> Result<LowerOutput, LowerFail> {
    let a = ctx.wired("a")?.expr;
    let b = ctx.wired("b")?.expr;
    let ty = ctx.output_ty("out")?;
    let e = ctx.kernel_auto(op, &[a, b], ty)?;
    Ok(LowerOutput::single("out", e))
}

fn lower_add(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    lower_zip(ctx, kernels::ADD)
}

fn lower_sub(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    lower_zip(ctx, kernels::SUB)
}

fn lower_mul(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    lower_zip(ctx, kernels::MUL)
}

fn lower_div(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    lower_zip(ctx, kernels::DIV)
}

fn lower_mix(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let a = ctx.wired("a")?.expr;
    let b = ctx.wired("b")?.expr;
    let t = ctx.wired("t")?.expr;
    let ty = ctx.output_ty("out")?;
    let e = ctx.kernel_auto(kernels::MIX, &[a, b, t], ty)?;
    Ok(LowerOutput::single("out", e))
}

/// Whole-value pick: which < 0.5 takes `a`, otherwise `b`. An unwired
/// selector defaults to `a`.
fn lower_select(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let a = ctx.wired("a")?.expr;
    let b = ctx.wired("b")?.expr;
    let ty = ctx.output_ty("out")?;
    let which = match ctx.input("which").map(|w| w.expr) {
        Some(e) => e,
        None => ExprId::Value(
            ctx.ir
                .value_const(Value::Scalar(0.0), ConcreteType::signal(Payload::Float)),
        ),
    };
    let e = ctx.kernel_auto(kernels::SELECT, &[which, a, b], ty)?;
    Ok(LowerOutput::single("out", e))
}

fn lower_pack(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let x = ctx.wired("x")?.expr;
    let y = ctx.wired("y")?.expr;
    let z = ctx.wired("z")?.expr;
    let ty = ctx.output_ty("out")?;
    let e = ctx.ir.construct(&[x, y, z], ty)?;
    Ok(LowerOutput::single("out", e))
}

fn lower_component(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let index = ctx.config_u32_or("index", 0)?;
    let wired = ctx.wired("in")?;
    let lanes = wired.ty.stride();
    if index >= lanes {
        return Err(LowerFail::BadConfig {
            key: "index",
            message: format!("expected a lane index below {lanes}"),
        });
    }
    let child = wired.expr;
    let ty = ctx.output_ty("out")?;
    let e = ctx.ir.extract(child, index as u8, ty);
    Ok(LowerOutput::single("out", e))
}

// ── Element domains ──────────────────────────────────────────────────────

fn lower_spawn(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let count = ctx.config_u32_or("count", 8)?;
    let inst = ctx.ir.alloc_instance(ctx.block, count, ctx.block_name);
    ctx.bind_output_instance("index", inst)?;
    ctx.bind_output_instance("normalizedIndex", inst)?;
    ctx.bind_output_instance("randomId", inst)?;

    let index_ty = ctx.output_ty("index")?;
    let norm_ty = ctx.output_ty("normalizedIndex")?;
    let id_ty = ctx.output_ty("randomId")?;
    let index = ctx.ir.field_source(inst, IntrinsicChannel::Index, index_ty);
    let norm = ctx
        .ir
        .field_source(inst, IntrinsicChannel::NormalizedIndex, norm_ty);
    let id = ctx.ir.field_source(inst, IntrinsicChannel::RandomId, id_ty);
    Ok(LowerOutput::single("index", index)
        .with("normalizedIndex", norm)
        .with("randomId", id)
        .spawned(inst))
}

fn parse_channel(name: &str) -> Option<IntrinsicChannel> {
    match name {
        "index" => Some(IntrinsicChannel::Index),
        "normalizedIndex" => Some(IntrinsicChannel::NormalizedIndex),
        "randomId" => Some(IntrinsicChannel::RandomId),
        _ => None,
    }
}

/// Reads an intrinsic channel of the domain the wired field lives in.
fn lower_channel(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    ctx.wired("in")?;
    let channel = ctx.require_config_str("name").and_then(|name| {
        parse_channel(name).ok_or_else(|| LowerFail::BadConfig {
            key: "name",
            message: "expected one of: index, normalizedIndex, randomId".to_string(),
        })
    })?;
    let ty = ctx.output_ty("out")?;
    let inst = ctx.instance;
    let e = ctx.ir.field_intrinsic(inst, channel, ty)?;
    Ok(LowerOutput::single("out", e))
}

fn reduction_op(name: &str) -> Option<KernelOp> {
    match name {
        "sum" => Some(kernels::ADD),
        "min" => Some(kernels::MIN),
        "max" => Some(kernels::MAX),
        _ => None,
    }
}

fn lower_reduce(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let op = match ctx.config_str("op") {
        None => kernels::ADD,
        Some(name) => reduction_op(name).ok_or_else(|| LowerFail::BadConfig {
            key: "op",
            message: "expected one of: sum, min, max".to_string(),
        })?,
    };
    let field = match ctx.wired("in")?.expr {
        ExprId::Field(f) => f,
        // Only reachable after a wire conflict was already reported.
        ExprId::Value(_) => return Err(LowerFail::MissingInput { port: "in" }),
    };
    let ty = ctx.output_ty("out")?;
    let e = ctx.ir.fold(op, field, ty);
    Ok(LowerOutput::single("out", e))
}

fn lower_path_deriv(
    ctx: &mut LowerCtx<'_>,
    kind: PathDerivKind,
) -> Result<LowerOutput, LowerFail> {
    let field = match ctx.wired("in")?.expr {
        ExprId::Field(f) => f,
        ExprId::Value(_) => return Err(LowerFail::MissingInput { port: "in" }),
    };
    let ty = ctx.output_ty("out")?;
    let e = ctx.ir.path_derivative(kind, field, ty);
    Ok(LowerOutput::single("out", e))
}

fn lower_path_tangent(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    lower_path_deriv(ctx, PathDerivKind::Tangent)
}

fn lower_path_arc_length(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    lower_path_deriv(ctx, PathDerivKind::ArcLength)
}

// ── Feedback ─────────────────────────────────────────────────────────────

/// One-frame delay. Reads last frame's value, so wiring through it is the
/// supported way to close a loop.
fn lower_delay(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let initial = ctx.config_f64_or("initial", 0.0)?;
    let ty = ctx.output_ty("out")?;
    let state = ctx.ir.alloc_state(ty.stride(), ctx.instance, initial);
    let read = ctx.ir.state_read(state, ty);
    match ctx.input("in").map(|w| w.expr) {
        Some(e) => ctx.ir.note_state_write(state, e),
        None if ctx.is_deferred("in") => ctx.defer_state_write("in", state),
        None => return Err(LowerFail::MissingInput { port: "in" }),
    }
    Ok(LowerOutput::single("out", read))
}

// ── Host boundary ────────────────────────────────────────────────────────

fn lower_expr(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let code = ctx.require_config_str("code")?.to_string();
    let ty = ctx.output_ty("out")?;
    let e = ctx.compile_expression(&code, &ty)?;
    Ok(LowerOutput::single("out", e))
}

fn lower_output(ctx: &mut LowerCtx<'_>) -> Result<LowerOutput, LowerFail> {
    let expr = ctx.wired("in")?.expr;
    ctx.ir.export(ctx.block_name, expr, ctx.block);
    Ok(LowerOutput::default())
}

// ── Registry assembly ────────────────────────────────────────────────────

fn add(registry: &mut Registry, def: BlockDef) {
    let name = def.name;
    if registry.register(def).is_err() {
        unreachable!("duplicate standard block '{}'", name);
    }
}

/// Same payload and unit on every listed port.
fn pu(param: &'static str) -> TypeTemplate {
    TypeTemplate::generic(param).unit_param("U")
}

/// The standard block set.
pub fn standard() -> Registry {
    let mut r = Registry::new();

    // Sources.
    add(
        &mut r,
        BlockDef::new("constant", lower_constant).output(
            "out",
            TypeTemplate::of(Payload::Float).temporality(Temporality::Static),
        ),
    );
    add(
        &mut r,
        BlockDef::new("vec2", lower_vec2).output(
            "out",
            TypeTemplate::of(Payload::Vec2).temporality(Temporality::Static),
        ),
    );
    add(
        &mut r,
        BlockDef::new("vec3", lower_vec3).output(
            "out",
            TypeTemplate::of(Payload::Vec3).temporality(Temporality::Static),
        ),
    );
    add(
        &mut r,
        BlockDef::new("time", lower_time).output(
            "out",
            TypeTemplate::of(Payload::Float)
                .unit(Unit::Milliseconds)
                .temporality(Temporality::Varying),
        ),
    );
    add(
        &mut r,
        BlockDef::new("external", lower_external).output(
            "out",
            TypeTemplate::of(Payload::Float).temporality(Temporality::Varying),
        ),
    );
    add(
        &mut r,
        BlockDef::new("osc", lower_osc)
            .input("freq", TypeTemplate::of(Payload::Float).unit(Unit::Hertz))
            .optional_input("phase", TypeTemplate::of(Payload::Float))
            .output(
                "out",
                TypeTemplate::of(Payload::Float)
                    .unit(Unit::Dimensionless)
                    .temporality(Temporality::Varying),
            ),
    );

    // Arithmetic. add/sub insist on one shared unit; mul/div scale by a
    // dimensionless factor.
    add(
        &mut r,
        BlockDef::new("add", lower_add)
            .input("a", pu("P"))
            .input("b", pu("P"))
            .output("out", pu("P")),
    );
    add(
        &mut r,
        BlockDef::new("sub", lower_sub)
            .input("a", pu("P"))
            .input("b", pu("P"))
            .output("out", pu("P")),
    );
    add(
        &mut r,
        BlockDef::new("mul", lower_mul)
            .input("a", pu("P"))
            .input("b", TypeTemplate::generic("P").unit(Unit::Dimensionless))
            .output("out", pu("P")),
    );
    add(
        &mut r,
        BlockDef::new("div", lower_div)
            .input("a", pu("P"))
            .input("b", TypeTemplate::generic("P").unit(Unit::Dimensionless))
            .output("out", pu("P")),
    );
    add(
        &mut r,
        BlockDef::new("mix", lower_mix)
            .input("a", pu("P"))
            .input("b", pu("P"))
            .input("t", TypeTemplate::of(Payload::Float))
            .output("out", pu("P"))
            .policy(BroadcastPolicy::DisallowSignalMix),
    );
    add(
        &mut r,
        BlockDef::new("select", lower_select)
            .input("a", pu("P"))
            .input("b", pu("P"))
            .optional_input("which", TypeTemplate::of(Payload::Float))
            .output("out", pu("P"))
            .policy(BroadcastPolicy::RequireBroadcastExpr)
            .broadcast_port("which"),
    );
    add(
        &mut r,
        BlockDef::new("pack", lower_pack)
            .input("x", TypeTemplate::of(Payload::Float).unit_param("U"))
            .input("y", TypeTemplate::of(Payload::Float).unit_param("U"))
            .input("z", TypeTemplate::of(Payload::Float).unit_param("U"))
            .output("out", TypeTemplate::of(Payload::Vec3).unit_param("U")),
    );
    add(
        &mut r,
        BlockDef::new("component", lower_component)
            .input("in", pu("P"))
            .output("out", TypeTemplate::of(Payload::Float).unit_param("U")),
    );

    // Element domains.
    add(
        &mut r,
        BlockDef::new("spawn", lower_spawn)
            .output(
                "index",
                TypeTemplate::of(Payload::Float)
                    .unit(Unit::Dimensionless)
                    .temporality(Temporality::Varying),
            )
            .output(
                "normalizedIndex",
                TypeTemplate::of(Payload::Float)
                    .unit(Unit::Normalized)
                    .temporality(Temporality::Varying),
            )
            .output(
                "randomId",
                TypeTemplate::of(Payload::Float)
                    .unit(Unit::Normalized)
                    .temporality(Temporality::Varying),
            )
            .mode(CardinalityMode::Transform),
    );
    add(
        &mut r,
        BlockDef::new("channel", lower_channel)
            .input("in", TypeTemplate::generic("P").many())
            .output(
                "out",
                TypeTemplate::of(Payload::Float).unit(Unit::Dimensionless),
            ),
    );
    add(
        &mut r,
        BlockDef::new("reduce", lower_reduce)
            .input("in", pu("P").many())
            .output("out", pu("P"))
            .mode(CardinalityMode::SignalOnly)
            .coupling(LaneCoupling::LaneCoupled),
    );
    add(
        &mut r,
        BlockDef::new("pathTangent", lower_path_tangent)
            .input("in", TypeTemplate::of(Payload::Vec3).unit_param("U").many())
            .output("out", TypeTemplate::of(Payload::Vec3).unit_param("U"))
            .mode(CardinalityMode::FieldOnly)
            .coupling(LaneCoupling::LaneCoupled),
    );
    add(
        &mut r,
        BlockDef::new("pathArcLength", lower_path_arc_length)
            .input("in", TypeTemplate::of(Payload::Vec3).unit_param("U").many())
            .output("out", TypeTemplate::of(Payload::Float).unit_param("U"))
            .mode(CardinalityMode::FieldOnly)
            .coupling(LaneCoupling::LaneCoupled),
    );

    // Feedback.
    add(
        &mut r,
        BlockDef::new("delay", lower_delay)
            .input("in", pu("P"))
            .output("out", pu("P").temporality(Temporality::Varying))
            .feedback(),
    );

    // Host boundary.
    add(
        &mut r,
        BlockDef::new("expr", lower_expr)
            .optional_input("a", TypeTemplate::generic("A").unit_param("UA"))
            .optional_input("b", TypeTemplate::generic("B").unit_param("UB"))
            .optional_input("c", TypeTemplate::generic("C").unit_param("UC"))
            .output("out", TypeTemplate::of(Payload::Float)),
    );
    add(
        &mut r,
        BlockDef::new("output", lower_output).input("in", TypeTemplate::generic("P")),
    );

    r
}
