use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use macho_reader::{nm, MachO};

/// Display the symbol table of Mach-O files.
#[derive(Debug, Parser)]
#[command(name = "macho-nm")]
struct Args {
    /// Display all symbol table entries, including those inserted for use by debuggers.
    #[arg(short = 'a')]
    all: bool,

    /// Display only global (external) symbols.
    #[arg(short = 'g')]
    globals_only: bool,

    /// Display only undefined symbols.
    #[arg(short = 'u')]
    undefined_only: bool,

    /// Sort numerically rather than alphabetically.
    #[arg(short = 'n')]
    numeric: bool,

    /// Don't sort; display in symbol-table order.
    #[arg(short = 'p')]
    unsorted: bool,

    /// Sort in reverse order.
    #[arg(short = 'r')]
    reverse: bool,

    /// Just display the symbol names (no value or type).
    #[arg(short = 'j')]
    names_only: bool,

    /// Object files to list.
    #[arg(default_value = "a.out")]
    files: Vec<PathBuf>,
}

impl Args {
    fn options(&self) -> nm::Options {
        nm::Options {
            all: self.all,
            globals_only: self.globals_only,
            undefined_only: self.undefined_only,
            numeric: self.numeric,
            unsorted: self.unsorted,
            reverse: self.reverse,
            names_only: self.names_only,
        }
    }
}

fn main() -> ExitCode {
    setup_logging();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let options = args.options();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let many = args.files.len() > 1;
    for path in &args.files {
        let macho = MachO::open(path)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if many {
            writeln!(out, "\n{}:", path.display())?;
        }
        nm::render(&macho, &options, &mut out)
            .with_context(|| format!("failed to list symbols of {}", path.display()))?;
    }
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
}
