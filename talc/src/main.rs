//! The thin demonstration CLI driver (§4.9): parses a subcommand, builds
//! one of the hard-coded fixture programs in [`fixtures`] (there is no
//! parser crate in this repository — real source files are out of
//! scope), runs it through `talc-pipeline::compile`, and reports
//! diagnostics or a pretty-printed IR dump.

mod fixtures;

use clap::{Args, Parser, Subcommand};
use talc_check::CompilerContext;
use talc_pipeline::{compile, CompilerSettings};
use talc_target::ArchitectureSizes;

#[derive(Parser)]
#[command(name = "talc", version, author, about = "Ahead-of-time compiler middle-end for the Talc language")]
struct CompilerOptions {
    /// Log job-scheduler transitions and compiler settings to stderr
    #[arg(short, long)]
    debug: bool,

    /// Target triple, e.g. x86_64-unknown-linux-gnu
    #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
    target: String,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Type-check a fixture program and report any diagnostics
    Check(StageArgs),
    /// Type-check and lower a fixture program, printing its generated HLIR
    IrGen(StageArgs),
}

#[derive(Args)]
struct StageArgs {
    /// Which built-in fixture program to compile
    #[arg(long, default_value = "add")]
    fixture: String,
}

fn main() {
    pretty_env_logger::init();
    let opts = CompilerOptions::parse();
    let exit_code = match &opts.mode {
        Mode::Check(args) => run(args, opts.debug, &opts.target, false),
        Mode::IrGen(args) => run(args, opts.debug, &opts.target, true),
    };
    std::process::exit(exit_code);
}

fn run(args: &StageArgs, debug: bool, target: &str, dump_ir: bool) -> i32 {
    let settings = CompilerSettings { dump_ir, target_triple: target.to_string(), ..CompilerSettings::default() };
    if debug {
        log::debug!("fixture: {}, settings: {settings:?}", args.fixture);
    }

    let mut ctx = CompilerContext::new(ArchitectureSizes::default());
    let Some(top_level) = fixtures::build(&mut ctx, &args.fixture) else {
        eprintln!("unknown fixture `{}` (known: {})", args.fixture, fixtures::NAMES.join(", "));
        return 1;
    };

    let output = compile(&mut ctx, &settings, top_level);

    for report in ctx.sink.reports() {
        eprintln!("{report}");
    }

    match output {
        Some(output) if dump_ir => {
            println!("{output:#?}");
            0
        }
        Some(_) => {
            println!("ok: `{}` compiled with no errors", args.fixture);
            0
        }
        None => 1,
    }
}
