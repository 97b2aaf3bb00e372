//! CLI entry point: `sghydro <params-file>` (spec §6, mirroring
//! `examples/original_source/main.c`'s `argc != 2` usage check).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use sghydro::config::Params;
use sghydro::driver::{self, NullDumpSink};
use sghydro::error::HydroError;
use sghydro::mesh_gen::{BlockMesh, BoundarySpec, MeshSource};

#[derive(Parser, Debug)]
#[command(name = "sghydro", about = "Unstructured staggered-grid hydrodynamics solver")]
struct Cli {
    /// Path to the parameter file (spec §6's `key = value` format).
    params_file: PathBuf,

    /// Enables debug-level tracing output.
    #[arg(short, long)]
    verbose: bool,

    /// Relative tolerance used when comparing final totals against `tests.energy` /
    /// `tests.density`, if present in the parameter file.
    #[arg(long, default_value_t = 1e-2)]
    tolerance: f64,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

fn run(cli: &Cli) -> Result<(), HydroError> {
    let params = Params::load(&cli.params_file)?;

    let mesh = BlockMesh::generate(
        params.nx,
        params.ny,
        params.nz,
        params.width,
        params.height,
        params.depth,
        BoundarySpec::all_reflect(),
        |_| (1.0, 1.0),
    )?;

    tracing::info!(bytes = mesh.bytes_allocated(), "mesh generated");

    let wall_start = Instant::now();
    let totals = driver::run(&params, &mesh, &mut NullDumpSink)?;
    tracing::info!(elapsed_s = wall_start.elapsed().as_secs_f64(), "run finished");

    driver::validate_totals(&params, &totals, cli.tolerance)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            ExitCode::FAILURE
        }
    }
}
