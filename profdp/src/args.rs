use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use libprofdp::structs::AlignmentMode;
use strum::{Display, EnumString};

#[derive(Subcommand)]
pub enum SubCommands {
    #[command(about = "Run every DP algorithm for each model against each target sequence")]
    Align(AlignArgs),
    #[command(about = "Print one DP matrix for the first model and the first target sequence")]
    Dump(DumpArgs),
}

#[derive(Parser)]
#[command(name = "profdp")]
#[command(about = "Reference dual-mode profile HMM dynamic programming")]
pub struct Cli {
    #[command(subcommand)]
    pub command: SubCommands,

    /// Log more: -v for debug messages, -vv for trace messages
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// The number of threads that profdp will use
    #[arg(
        short = 't',
        long = "threads",
        default_value_t = 8usize,
        value_name = "n"
    )]
    pub num_threads: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    /// Model file
    #[arg(value_name = "MODEL.hmm")]
    pub model_path: PathBuf,

    /// Target file
    #[arg(value_name = "TARGET.fasta")]
    pub target_path: PathBuf,

    /// The alignment mode the profiles are configured in
    #[arg(
        short = 'm',
        long = "mode",
        default_value_t = AlignmentMode::Dual,
        value_name = "MODE"
    )]
    pub mode: AlignmentMode,

    /// The weight of residues aligned to the model in the optimal accuracy alignment
    #[arg(short = 'g', long = "gamma", default_value_t = 1.0, value_name = "F")]
    pub gamma: f32,
}

#[derive(Debug, Args)]
pub struct AlignArgs {
    /// Arguments that describe the model and target inputs
    #[command(flatten)]
    pub profile_args: ProfileArgs,

    /// Check every profile and DP matrix for invariant violations
    #[arg(long, action)]
    pub validate: bool,

    /// Write one JSON object per alignment instead of a table
    #[arg(long, action)]
    pub json: bool,

    /// Where to place the results; stdout if not given
    #[arg(short = 'O', long = "output", value_name = "path")]
    pub output_path: Option<PathBuf>,

    /// Arguments that are common across all profdp subcommands
    #[command(flatten)]
    pub common_args: CommonArgs,
}

/// The algorithm whose matrix `dump` prints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Algorithm {
    Forward,
    Backward,
    Decoding,
    Alignment,
    Viterbi,
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    /// Arguments that describe the model and target inputs
    #[command(flatten)]
    pub profile_args: ProfileArgs,

    /// The algorithm whose matrix is printed
    #[arg(
        short = 'a',
        long = "algorithm",
        default_value_t = Algorithm::Forward,
        value_name = "ALGORITHM"
    )]
    pub algorithm: Algorithm,

    /// Print the matrix as CSV
    #[arg(long, action)]
    pub csv: bool,

    /// Only print target rows i0..=i1 and model nodes k0..=k1
    #[arg(
        short = 'w',
        long = "window",
        num_args = 4,
        value_names = ["i0", "i1", "k0", "k1"]
    )]
    pub window: Option<Vec<usize>>,
}
