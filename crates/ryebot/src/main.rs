use std::process::ExitCode;

use clap::Parser;
use ryebot_core::dispatch::{self, ExitStatus, RunOptions};
use ryebot_core::logging;

#[derive(Debug, Parser)]
#[command(
    name = "ryebot",
    version,
    about = "Run one of the registered wiki automation scripts",
    after_help = "Exit codes: 0 success, 1 startup/login failure, 2 usage error, \
                  3 unknown script, 4 script error."
)]
struct Cli {
    /// Name of the script to run; omit to list the available scripts
    script: Option<String>,
    /// Compute and log all edits without sending any of them to the wiki
    #[arg(long)]
    dryrun: bool,
    /// GitHub Actions mode: annotation-formatted logs, a step summary
    /// artifact, and the run id appended to every edit summary
    #[arg(short = 'g', long)]
    github: bool,
    /// Lower the log threshold from info to debug
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.github);

    let Some(script) = cli.script else {
        print_script_listing();
        return ExitCode::SUCCESS;
    };

    tracing::info!(
        "started ryebot v{} for script \"{script}\"",
        env!("CARGO_PKG_VERSION")
    );
    let status = dispatch::run(&RunOptions {
        script,
        dry_run: cli.dryrun,
        ci_mode: cli.github,
        verbose: cli.verbose,
    });
    if status == ExitStatus::UnknownScript {
        eprintln!();
        print_script_listing();
    }
    ExitCode::from(status.code())
}

fn print_script_listing() {
    println!("Available scripts:");
    for descriptor in dispatch::list_scripts() {
        println!("  {:<16} {}", descriptor.name, descriptor.about);
    }
}
