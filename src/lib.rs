//! `basicc` — compiles a line-numbered numeric BASIC dialect to LLVM textual
//! IR, and optionally drives `clang`/`lli` to turn that IR into a binary or
//! run it directly.
//!
//! The compiler itself is a four-stage event pipeline (`FileReader` ->
//! `AsciiCategorizer` -> `Tokenizer` -> `SyntaxRecognizer`), all built on one
//! reusable FSM engine that supports sub-FSM delegation — see [`fsm`] for the
//! engine and [`syntax`] for how the expression grammar is factored out of
//! every statement that accepts one.

pub mod codegen;
pub mod engine;
pub mod error;
pub mod event;
pub mod fsm;
pub mod io;
pub mod syntax;
pub mod tokenizer;

pub use codegen::{ExprValue, LlvmIrGenerator, SemanticState};
pub use error::CompileError;
pub use syntax::SyntaxRecognizer;

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use std::sync::OnceLock;

use engine::EventEngine;
use event::Event;
use io::ascii::AsciiCategorizer;
use io::file_reader::FileReader;
use tokenizer::Tokenizer;

/// A [`CompileError`] plus the one-line-per-module diagnostic context the
/// pipeline's `report()` hooks contributed (spec.md §4.5/§7) — e.g. the
/// offending source line with a caret under the column the lexer/tokenizer
/// was looking at when it failed.
#[derive(Debug, Clone)]
pub struct CompileFailure {
    pub error: CompileError,
    pub context: Vec<String>,
}

impl std::fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.error)?;
        for line in &self.context {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileFailure {}

/// The three CLI-derived knobs (spec.md §6), plus the source path they apply
/// to. Constructed once in `main` and threaded through [`compile_file`].
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub source_path: PathBuf,
    /// `--opt`: also emit an `-Ofast`-optimized `.ll` via `clang -S -emit-llvm`.
    pub emit_opt: bool,
    /// `--bin <path>`: link an executable with `clang`.
    pub bin_output: Option<PathBuf>,
    /// `--lli`: interpret the generated IR with `lli` and forward its exit code.
    pub run_lli: bool,
}

impl CompilerConfig {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        CompilerConfig {
            source_path: source_path.into(),
            emit_opt: false,
            bin_output: None,
            run_lli: false,
        }
    }
}

/// Cache for the one-time `clang`/`lli` presence check (spec.md §6) — run
/// lazily, before the first subprocess invocation under `--opt`/`--bin`/`--lli`.
static TOOLCHAIN_CHECKED: OnceLock<Result<(), String>> = OnceLock::new();

fn check_toolchain(need_clang: bool, need_lli: bool) -> Result<(), CompileError> {
    TOOLCHAIN_CHECKED
        .get_or_init(|| {
            if need_clang && Command::new("clang").arg("--version").output().is_err() {
                return Err("clang not found on PATH; install LLVM/clang to use --opt or --bin".to_string());
            }
            if need_lli && Command::new("lli").arg("--version").output().is_err() {
                return Err("lli not found on PATH; install LLVM to use --lli".to_string());
            }
            Ok(())
        })
        .clone()
        .map_err(CompileError::io)
}

/// Runs the four-stage pipeline over the source file at `path` and returns
/// the generated IR text. `FileReader` does its own filesystem I/O — the
/// `"open"` event it's fed carries the path, not pre-read source text — so
/// on failure the returned [`CompileFailure`] carries whatever `report()`
/// context each module contributed (spec.md §7).
pub fn compile_source(path: impl Into<PathBuf>) -> Result<String, CompileFailure> {
    let path = path.into();
    let current_line = Rc::new(Cell::new(0usize));
    let output = Rc::new(RefCell::new(None));

    let mut engine = EventEngine::new(vec![
        Box::new(FileReader::new()),
        Box::new(AsciiCategorizer::new(Rc::clone(&current_line))),
        Box::new(Tokenizer::new(Rc::clone(&current_line))),
        Box::new(SyntaxRecognizer::new(
            path.display().to_string(),
            Rc::clone(&current_line),
            Rc::clone(&output),
        )),
    ]);

    if let Err(error) = engine.start(Event::with_str("open", path.display().to_string())) {
        return Err(CompileFailure { error, context: engine.report() });
    }

    match output.borrow_mut().take() {
        Some(ir) => Ok(ir),
        None => Err(CompileFailure {
            error: CompileError::io("compilation ended without producing IR (unexpected end of pipeline)"),
            context: engine.report(),
        }),
    }
}

/// Compiles `config.source_path`, writes `<stem>.ll` beside it, and runs
/// whichever of `--opt`/`--bin`/`--lli` the config requests (spec.md §6).
pub fn compile_file(config: &CompilerConfig) -> Result<(), CompileFailure> {
    let ir = compile_source(&config.source_path)?;

    let ll_path = config.source_path.with_extension("ll");
    fs::write(&ll_path, &ir)
        .map_err(|e| CompileError::io(format!("failed to write {}: {}", ll_path.display(), e)))
        .map_err(|error| CompileFailure { error, context: Vec::new() })?;

    let mut ll_for_downstream = ll_path.clone();

    if config.emit_opt || config.bin_output.is_some() || config.run_lli {
        check_toolchain(config.emit_opt || config.bin_output.is_some(), config.run_lli)
            .map_err(|error| CompileFailure { error, context: Vec::new() })?;
    }

    if config.emit_opt {
        let stem = config.source_path.file_stem().unwrap_or_default().to_string_lossy();
        let opt_path = config.source_path.with_file_name(format!("{}_Ofast.ll", stem));
        run_clang(&[
            "-Ofast".to_string(),
            "-S".to_string(),
            "-emit-llvm".to_string(),
            ll_path.to_string_lossy().into_owned(),
            "-o".to_string(),
            opt_path.to_string_lossy().into_owned(),
        ])
        .map_err(|error| CompileFailure { error, context: Vec::new() })?;
        ll_for_downstream = opt_path;
    }

    if let Some(bin_path) = &config.bin_output {
        run_clang(&[
            "-Ofast".to_string(),
            ll_for_downstream.to_string_lossy().into_owned(),
            "-o".to_string(),
            bin_path.to_string_lossy().into_owned(),
            "-lm".to_string(),
        ])
        .map_err(|error| CompileFailure { error, context: Vec::new() })?;
    }

    if config.run_lli {
        run_lli(&ll_for_downstream).map_err(|error| CompileFailure { error, context: Vec::new() })?;
    }

    Ok(())
}

fn run_clang(args: &[String]) -> Result<(), CompileError> {
    let status = Command::new("clang")
        .args(args)
        .status()
        .map_err(|e| CompileError::io(format!("failed to run clang: {}", e)))?;
    if !status.success() {
        return Err(CompileError::io(format!("clang exited with {}", status)));
    }
    Ok(())
}

/// Runs `lli` over the generated IR, forwarding its stdout/stderr and exit
/// code verbatim.
fn run_lli(ll_path: &Path) -> Result<(), CompileError> {
    let status = Command::new("lli")
        .arg(ll_path)
        .status()
        .map_err(|e| CompileError::io(format!("failed to run lli: {}", e)))?;
    if !status.success() {
        return Err(CompileError::io(format!("lli exited with {}", status)));
    }
    Ok(())
}
