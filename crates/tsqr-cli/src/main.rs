//! `tsqr`: factor a tall matrix file on P ranks, or generate a reference one.
//!
//! ```text
//! tsqr generate 1024 8 4 --output a.txt
//! tsqr factor --file a.txt -n 4 --silent
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tsqr::{
    generate::reference_matrix, io::read_matrix, io::write_matrix, KernelKind, RFactor,
    RunConfig, TsqrError,
};

#[derive(Parser)]
#[command(
    name = "tsqr",
    version = env!("CARGO_PKG_VERSION"),
    about = "Butterfly TSQR: the R factor of a tall, row-partitioned matrix"
)]
struct Cli {
    /// Log filter directive (e.g. `info`, `tsqr=debug`)
    #[arg(long, global = true, env = "TSQR_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the R factor of a matrix file
    Factor(FactorArgs),
    /// Write the reference test matrix
    Generate {
        /// Number of rows
        rows: usize,
        /// Number of columns
        columns: usize,
        /// Number of stacked blocks
        blocks: usize,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct FactorArgs {
    /// Input matrix file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Suppress the input echo and per-round matrices
    #[arg(short, long)]
    silent: bool,

    /// Number of thread ranks (a power of two)
    #[arg(short = 'n', long, env = "TSQR_PROCESSES", default_value_t = 1)]
    processes: usize,

    /// Local QR kernel
    #[arg(long, value_enum, env = "TSQR_KERNEL", default_value_t = KernelArg::Faer)]
    kernel: KernelArg,

    /// Take rank and size from the MPI world instead of spawning threads
    #[cfg(feature = "mpi")]
    #[arg(long)]
    mpi: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KernelArg {
    Faer,
    Householder,
}

impl From<KernelArg> for KernelKind {
    fn from(arg: KernelArg) -> Self {
        match arg {
            KernelArg::Faer => KernelKind::Faer,
            KernelArg::Householder => KernelKind::Householder,
        }
    }
}

fn init_logging(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the matrices
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Command::Factor(args) => factor(args),
        Command::Generate {
            rows,
            columns,
            blocks,
            output,
        } => generate(rows, columns, blocks, output.as_deref()),
    }
}

fn factor_usage() -> String {
    let mut cmd = Cli::command();
    cmd.find_subcommand_mut("factor")
        .map(|sub| sub.render_usage().to_string())
        .unwrap_or_else(|| "tsqr factor --file <FILE>".to_string())
}

fn factor(args: FactorArgs) -> Result<()> {
    let path = args.file.clone().ok_or_else(|| {
        TsqrError::InsufficientArguments(format!(
            "an input file is required\n\n{}",
            factor_usage()
        ))
    })?;
    let config = RunConfig::new(args.processes)
        .kernel(args.kernel.into())
        .verbose(!args.silent);

    #[cfg(feature = "mpi")]
    if args.mpi {
        return factor_mpi(&path, &config);
    }

    let stdout = io::stdout();
    factor_threads(&path, &config, &mut stdout.lock())
}

fn factor_threads<W: Write>(path: &Path, config: &RunConfig, out: &mut W) -> Result<()> {
    let input =
        read_matrix(path).with_context(|| format!("failed to load {}", path.display()))?;
    info!(
        rows = input.matrix.rows(),
        cols = input.matrix.cols(),
        processes = config.processes,
        kernel = %config.kernel,
        "factoring"
    );
    if config.verbose {
        writeln!(out, "Matrix A:\n{}", input.matrix)?;
    }

    let run = tsqr::run_with_config(&input.matrix, config).context("reduction failed")?;
    debug!(disagreement = run.max_disagreement(), "gathered rank outcomes");
    report(out, &run.root().r, run.max_elapsed())
}

#[cfg(feature = "mpi")]
fn factor_mpi(path: &Path, config: &RunConfig) -> Result<()> {
    use tsqr::{Communicator, FaerKernel, HouseholderKernel, MpiComm};

    let universe = mpi::initialize().context("MPI is already initialized")?;
    let comm = MpiComm::new(universe.world());
    let root = comm.rank() == 0;

    let outcome = read_matrix(path)
        .with_context(|| format!("failed to load {}", path.display()))
        .and_then(|input| {
            if root && config.verbose {
                println!("Matrix A:\n{}", input.matrix);
            }
            let outcome = match config.kernel {
                KernelKind::Faer => tsqr::run_rank(&comm, &FaerKernel, &input.matrix, config.verbose),
                KernelKind::Householder => {
                    tsqr::run_rank(&comm, &HouseholderKernel, &input.matrix, config.verbose)
                }
            };
            outcome.context("reduction failed")
        });

    match outcome {
        Ok(outcome) if root => {
            let stdout = io::stdout();
            report(&mut stdout.lock(), &outcome.r, outcome.elapsed)
        }
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("Error on rank {}: {:#}", comm.rank(), e);
            comm.abort(1);
            Err(e)
        }
    }
}

fn report<W: Write>(out: &mut W, r: &RFactor, elapsed: Duration) -> Result<()> {
    writeln!(out, "{}", r)?;
    writeln!(out, "Time: {:.6}", elapsed.as_secs_f64())?;
    Ok(())
}

fn generate(rows: usize, columns: usize, blocks: usize, output: Option<&Path>) -> Result<()> {
    let input = reference_matrix(rows, columns, blocks)?;
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_matrix(&mut writer, &input)?;
            writer.flush()?;
            info!(path = %path.display(), rows, columns, blocks, "wrote reference matrix");
        }
        None => {
            let stdout = io::stdout();
            write_matrix(stdout.lock(), &input)?;
        }
    }
    Ok(())
}
