use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use macho_reader::{
    section_map::{self, SectionMap},
    MachO,
};

/// Generate C reservations for the entries of a Mach-O image's `z_macho_map` section.
#[derive(Debug, Parser)]
#[command(name = "macho-map")]
struct Args {
    /// Linked Mach-O image to scan.
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// C source file to write.
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Log every recovered entry.
    #[arg(long)]
    dump: bool,
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
    let macho = MachO::open(&args.input)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;
    let input = File::open(&args.input)
        .with_context(|| format!("failed to reopen {}", args.input.display()))?;
    let entries = section_map::recover_entries(&macho, BufReader::new(input))
        .with_context(|| format!("failed to read {}", section_map::MARKER_SECTION))?;
    if args.dump {
        for entry in &entries {
            info!(
                name = %entry.name,
                address = format_args!("{:#x}", entry.address),
                size = entry.size,
                "map entry"
            );
        }
    }

    let map = SectionMap::from_entries(&entries)?;
    let output = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut out = BufWriter::new(output);
    map.write_c(&mut out)?;
    out.flush()?;
    info!(
        regions = map.len(),
        entries = entries.len(),
        "wrote {}",
        args.output.display()
    );
    Ok(())
}

fn setup_logging() {
    // --dump logs at info, so show info unless RUST_LOG says otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
