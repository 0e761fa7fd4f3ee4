use clap::Parser;
use colored::*;
use sheetmove_core::{cli, convert_csv};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "csv2xlsx")]
#[command(about = "Convert a CSV file into a single-sheet XLSX workbook", long_about = None)]
#[command(version)]
struct Cli {
    /// CSV file with a header row
    #[arg(allow_hyphen_values = true, value_name = "SOURCE.CSV")]
    source: PathBuf,

    /// Workbook to create (replaced if it exists)
    #[arg(allow_hyphen_values = true, value_name = "DEST.XLSX")]
    dest: PathBuf,
}

fn main() -> ExitCode {
    cli::run::<Cli, _, _, _>(std::env::args_os(), 2, |cli| {
        let rows = convert_csv(&cli.source, &cli.dest)?;

        println!(
            "{} Wrote {} rows to {}",
            "✓".green().bold(),
            rows,
            cli.dest.display()
        );
        Ok(())
    })
}
