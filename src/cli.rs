use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "syre-version-converter",
    version,
    about = "Convert Syre projects and the local Syre config between format versions"
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert registered projects from one version to another.
    Convert {
        /// Version the data is in now, e.g. 0.10.2.
        initial: String,
        /// Version to convert to, e.g. 0.11.0.
        #[arg(value_name = "FINAL")]
        target: String,
        /// Convert only the project at this path.
        #[arg(short, long)]
        project: Option<PathBuf>,
        /// Keep going after a project fails.
        #[arg(long)]
        best_effort: bool,
    },
    /// List known versions and available conversion steps.
    Versions,
    /// Show config locations, the current user and registered projects.
    Status,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}: {}", report.command, if report.ok { "ok" } else { "failed" });
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let report = match cli.command {
        Command::Convert {
            initial,
            target,
            project,
            best_effort,
        } => commands::convert::run(&commands::convert::ConvertOptions {
            initial,
            target,
            project,
            best_effort,
        })?,
        Command::Versions => commands::versions::run()?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        bail!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}
