use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Problem adapter selected by `-p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProblemKind {
    Fusion,
    #[value(alias = "nonseparable")]
    NonSeparable,
}

/// Solver selected by `-s`. Only `Dab` is implemented; `Sa` is a stub
/// that fails validation at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SolverKind {
    Dab,
    Sa,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "dab", version, about = "Distributed Artificial Bee Colony optimizer")]
pub struct Cli {
    /// Problem type, selects the Problem adapter.
    #[arg(short = 'p', long = "problem", value_enum)]
    pub problem: ProblemKind,

    /// Solver type.
    #[arg(short = 's', long = "solver", value_enum, default_value_t = SolverKind::Dab)]
    pub solver: SolverKind,

    /// Path to the XML parameter-schema file.
    #[arg(short = 'i', long = "schema")]
    pub schema_path: PathBuf,

    /// Path to the INI configuration file.
    #[arg(short = 'c', long = "config")]
    pub config_path: PathBuf,

    /// Verbosity: 1 silences warnings, 2 silences info, 3 silences debug.
    #[arg(
        short = 'v',
        long = "verbosity",
        value_parser = clap::value_parser!(u8).range(1..=3)
    )]
    pub verbosity: u8,

    /// Optional RNG seed for reproducible runs.
    #[arg(long, env = "DAB_SEED")]
    pub seed: Option<u64>,

    /// Directory the on-disk queues and promoted-best snapshots are
    /// written under; defaults to the current directory.
    #[arg(long = "run-dir", env = "DAB_RUN_DIR")]
    pub run_dir: Option<PathBuf>,
}
