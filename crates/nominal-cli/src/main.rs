//! `nominal` — the standalone driver (spec.md §6): executes files,
//! inline source, and/or drops into a REPL, with the prelude's native
//! functions (print, if, while, forKeys, forValues, assertEqual,
//! collectGarbage) installed ahead of anything else.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;

use nominal_cli::{prelude, repl};
use nominal_compiler::State;

#[derive(ClapParser)]
#[command(name = "nominal")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Interpreter for the Nominal scripting language", long_about = None)]
struct Cli {
    /// Enter the REPL after running any files or --code
    #[arg(short, long)]
    interactive: bool,

    /// Execute this source string before any files
    #[arg(short, long, value_name = "SRC")]
    code: Option<String>,

    /// Source files to execute, in order
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("NOMINAL_LOG")
                .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut state = State::new();
    prelude::install(&mut state);

    let mut had_error = false;

    if let Some(src) = &cli.code {
        if let Err(e) = state.execute(src) {
            eprintln!("Error: {e}");
            had_error = true;
        }
    }

    for path in &cli.files {
        if let Err(e) = state.do_file(path) {
            eprintln!("Error: {e}");
            had_error = true;
        }
    }

    if cli.interactive || (cli.code.is_none() && cli.files.is_empty()) {
        repl::run(&mut state);
    }

    if had_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
