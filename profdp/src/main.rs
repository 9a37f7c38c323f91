mod align;
mod args;
mod dump;
mod input;
mod util;

use align::align;
use args::{Cli, SubCommands};
use dump::dump;
use util::{init_logging, set_threads};

use clap::Parser;

fn main() -> anyhow::Result<()> {
    color_backtrace::install();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        SubCommands::Align(args) => {
            set_threads(args.common_args.num_threads)?;
            align(&args)?;
        }
        SubCommands::Dump(args) => {
            dump(&args)?;
        }
    }
    Ok(())
}
