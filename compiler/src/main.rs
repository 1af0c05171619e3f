use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    /// Compile and report diagnostics only
    Check,
    /// Resolved port types per block
    Types,
    /// Expression tables after lowering
    Ir,
    /// Full compiled program: tables plus frame steps
    Steps,
    /// Patch wiring as Graphviz DOT
    Dot,
    /// Expression dataflow as Graphviz DOT
    IrDot,
    /// Provenance manifest as JSON
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "flockc",
    version,
    about = "Flock patch compiler — compiles JSON patch documents into frame programs"
)]
struct Cli {
    /// Input patch document (JSON)
    patch: PathBuf,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Steps)]
    emit: EmitStage,

    /// Run the compiled program for N frames and print its outputs
    #[arg(long)]
    frames: Option<u64>,

    /// Frame spacing in milliseconds when running with --frames
    #[arg(long, default_value_t = 16.0)]
    dt_ms: f64,

    /// Bind an external input when running with --frames (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Print compiler passes and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flockc=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        eprintln!("flockc: patch = {}", cli.patch.display());
        eprintln!("flockc: emit  = {:?}", cli.emit);
    }

    // ── Read and parse the patch document ──
    let source = match std::fs::read_to_string(&cli.patch) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("flockc: error: {}: {}", cli.patch.display(), e);
            std::process::exit(2);
        }
    };

    let patch: flockc::graph::Patch = match serde_json::from_str(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("flockc: error: {}: {}", cli.patch.display(), e);
            std::process::exit(1);
        }
    };

    let registry = flockc::catalog::standard();
    if cli.verbose {
        eprintln!("flockc: {} block types registered", registry.len());
    }

    // Pre-compile artifacts render even for patches that would not lower.
    match cli.emit {
        EmitStage::Dot => {
            print!("{}", flockc::dot::emit_dot(&patch, &registry));
            return;
        }
        EmitStage::BuildInfo => {
            println!(
                "{}",
                flockc::pipeline::compute_provenance(&patch, &registry).to_json()
            );
            return;
        }
        _ => {}
    }

    // ── Compile ──
    let terminal = if cli.frames.is_some() {
        flockc::pass::PassId::Schedule
    } else {
        match cli.emit {
            EmitStage::Types => flockc::pass::PassId::Lower,
            _ => flockc::pass::PassId::Schedule,
        }
    };
    let options = flockc::pipeline::CompileOptions {
        terminal,
        verbose: cli.verbose,
    };
    let result = flockc::pipeline::compile(
        &patch,
        &registry,
        &flockc::lower::NullExpressionCompiler,
        options,
    );

    for diag in &result.diagnostics {
        eprintln!("flockc: {}", diag);
    }
    if result.has_errors() {
        std::process::exit(1);
    }

    match cli.emit {
        EmitStage::Check | EmitStage::Dot | EmitStage::BuildInfo => {}
        EmitStage::Types => {
            if let Some(dump) = &result.types_dump {
                print!("{}", dump);
            }
        }
        EmitStage::Ir => {
            if let Some(program) = &result.program {
                print!("{}", program.tables);
            }
        }
        EmitStage::Steps => {
            if let Some(program) = &result.program {
                print!("{}", program);
            }
        }
        EmitStage::IrDot => {
            if let Some(program) = &result.program {
                print!("{}", flockc::dot::emit_ir_dot(program));
            }
        }
    }

    // ── Run ──
    if let Some(frames) = cli.frames {
        let program = match result.program {
            Some(p) => p,
            None => {
                eprintln!("flockc: error: no program to run");
                std::process::exit(1);
            }
        };
        let mut driver = flockc::exec::FrameDriver::new(program);
        for binding in &cli.set {
            match parse_binding(binding) {
                Some((name, v)) => driver.set_external(name, flockc::value::Value::Scalar(v)),
                None => {
                    eprintln!(
                        "flockc: error: malformed --set '{}', expected NAME=VALUE",
                        binding
                    );
                    std::process::exit(2);
                }
            }
        }
        let mut ctx = flockc::value::FrameCtx::start();
        for _ in 0..frames {
            let outputs = driver.run_frame(ctx);
            print_frame(&outputs);
            ctx = ctx.advanced(cli.dt_ms);
        }
    }
}

fn parse_binding(s: &str) -> Option<(&str, f64)> {
    let (name, value) = s.split_once('=')?;
    Some((name, value.trim().parse().ok()?))
}

fn print_frame(outputs: &flockc::exec::FrameOutputs) {
    print!("frame {}:", outputs.frame);
    for (name, data) in &outputs.outputs {
        match data {
            flockc::exec::OutputData::Signal(v) => print!(" {name}={v}"),
            flockc::exec::OutputData::Field { stride, data, .. } => {
                print!(" {name}=[");
                for (i, element) in data.chunks(*stride as usize).enumerate() {
                    if i > 0 {
                        print!(", ");
                    }
                    if let [lane] = element {
                        print!("{lane}");
                    } else {
                        print!("(");
                        for (k, lane) in element.iter().enumerate() {
                            if k > 0 {
                                print!(", ");
                            }
                            print!("{lane}");
                        }
                        print!(")");
                    }
                }
                print!("]");
            }
        }
    }
    println!();
}
