use clap::Parser;
use colored::*;
use sheetmove_core::{EvalRequest, cli, evaluate_range};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "eval2csv")]
#[command(about = "Evaluate the formulas of an XLSX range and write the results as CSV", long_about = None)]
#[command(version)]
struct Cli {
    /// Workbook whose formulas are evaluated
    #[arg(allow_hyphen_values = true, value_name = "SOURCE.XLSX")]
    source: PathBuf,

    /// Sheet holding the range
    #[arg(allow_hyphen_values = true, value_name = "SrcSheet")]
    sheet: String,

    /// Cells to evaluate, e.g. A2:F100
    #[arg(allow_hyphen_values = true, value_name = "SrcRange")]
    range: String,

    /// CSV file to write
    #[arg(allow_hyphen_values = true, value_name = "DEST.CSV")]
    dest: PathBuf,

    /// `true` to stop at the first row whose first cell is empty
    #[arg(allow_hyphen_values = true, value_name = "TruncateFlag")]
    truncate: String,
}

fn main() -> ExitCode {
    cli::run::<Cli, _, _, _>(std::env::args_os(), 5, |cli| {
        let request = EvalRequest {
            source_path: cli.source,
            sheet: cli.sheet,
            range: cli.range,
            dest_path: cli.dest,
            truncate_flag: cli.truncate,
        };
        let rows = evaluate_range(&request)?;

        println!(
            "{} Wrote {} rows to {}",
            "✓".green().bold(),
            rows,
            request.dest_path.display()
        );
        Ok(())
    })
}
