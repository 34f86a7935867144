//! `translator`: ahead-of-time compiles a statically-linked RV64GC ELF into
//! a single WebAssembly module (§6.1).
//!
//! Each pipeline stage's typed error is wrapped with `anyhow::Context` to
//! attach the stage name and the input path before the outermost error is
//! mapped to an exit code and a one-line diagnostic on stderr. No partial
//! module is ever written: the output file is only created once every
//! stage, including the emitter's `wasmparser` validation pass, succeeds.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use rv2wasm_types::TranslateOptions;

/// Ahead-of-time translator from statically-linked RV64GC ELF binaries to a
/// single WebAssembly module.
#[derive(Parser, Debug)]
#[command(name = "translator")]
struct Args {
    /// Statically-linked RV64GC ELF input.
    input: PathBuf,

    /// Output Wasm module path.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Print per-segment and per-block statistics while translating.
    #[arg(long)]
    verbose: bool,

    /// Export `block_<hex addr>` functions and keep a guest-PC-to-function
    /// mapping for host-side debugging.
    #[arg(long)]
    debug: bool,

    /// Optimization level (0, 1 or 2); currently only affects whether the
    /// translator caches repeated register reads in scratch locals.
    #[arg(long = "opt", default_value_t = 2)]
    opt: u8,
}

/// A pipeline stage's failure, tagged with the exit code §6.1 assigns it.
/// Kept separate from the `anyhow::Error` chain's free-form context strings
/// so `main` can recover the right exit code regardless of how much context
/// was layered on top.
#[derive(thiserror::Error, Debug)]
enum StageError {
    #[error("{0}")]
    Io(std::io::Error),
    #[error(transparent)]
    BadElf(#[from] rv2wasm_elf::ElfError),
    #[error(transparent)]
    Decode(#[from] rv2wasm_cfg::CfgError),
    #[error(transparent)]
    Emission(#[from] rv2wasm_emit::EmitError),
}

impl StageError {
    fn exit_code(&self) -> u8 {
        match self {
            StageError::Io(_) => 1,
            StageError::BadElf(_) => 2,
            StageError::Decode(_) => 3,
            StageError::Emission(_) => 4,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .chain()
                .find_map(|e| e.downcast_ref::<StageError>())
                .map(StageError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

fn run(args: &Args) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.input)
        .map_err(StageError::Io)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let image = rv2wasm_elf::parse(&bytes)
        .map_err(StageError::from)
        .with_context(|| format!("parsing {} as a statically-linked RV64 ELF", args.input.display()))?;

    let graph = rv2wasm_cfg::build(&image).map_err(StageError::from).context("building control-flow graph")?;

    if args.verbose {
        log::info!("{} executable segment(s), {} block(s)", image.segments_for_code().count(), graph.len());
    }

    let blocks: Vec<_> = graph.blocks().iter().map(rv2wasm_translate::translate_block).collect();

    let options = TranslateOptions { opt_level: args.opt, debug: args.debug, verbose: args.verbose };
    let module = rv2wasm_emit::emit(&image, &blocks, &options)
        .map_err(StageError::from)
        .context("emitting wasm module")?;

    std::fs::write(&args.output, &module)
        .map_err(StageError::Io)
        .with_context(|| format!("writing {}", args.output.display()))?;

    log::info!("wrote {} ({} bytes)", args.output.display(), module.len());
    Ok(())
}
