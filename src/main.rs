//! `phasetrack` - Phase tracking engine

use clap::Parser;

use phasetrack::cli::args::{Cli, OutputFormat};
use phasetrack::cli::commands;
use phasetrack::error::ExitCode;
use phasetrack::observability::{LogFormat, describe_metrics, init_logging};

fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        let format = match cli.log_format {
            OutputFormat::Human => LogFormat::Human,
            OutputFormat::Json => LogFormat::Json,
        };
        init_logging(format, cli.verbose, cli.color);
    }
    describe_metrics();

    match commands::dispatch(cli) {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
