//! `basicc` CLI — compiles a line-numbered numeric BASIC source file to
//! LLVM textual IR, and optionally drives `clang`/`lli` on the result.

use clap::Parser;
use std::path::PathBuf;
use std::process;

use basicc::CompilerConfig;

#[derive(Parser)]
#[command(name = "basicc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile a line-numbered numeric BASIC dialect to LLVM IR", long_about = None)]
struct Cli {
    /// BASIC source file to compile
    input: PathBuf,

    /// Also emit an `-Ofast`-optimized `.ll` via `clang -S -emit-llvm`
    #[arg(long)]
    opt: bool,

    /// Link an executable at this path with `clang`
    #[arg(long, value_name = "PATH")]
    bin: Option<PathBuf>,

    /// Interpret the generated IR with `lli` and forward its exit code
    #[arg(long)]
    lli: bool,
}

fn main() {
    let cli = Cli::parse();

    let mut config = CompilerConfig::new(cli.input);
    config.emit_opt = cli.opt;
    config.bin_output = cli.bin;
    config.run_lli = cli.lli;

    match basicc::compile_file(&config) {
        Ok(()) => {
            println!("Compiled {}", config.source_path.display());
        }
        Err(failure) => {
            eprintln!("{}", failure);
            process::exit(1);
        }
    }
}
