use clap::Parser;
use colored::*;
use sheetmove_core::{CopyRequest, cli, copy_range};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "copyrange")]
#[command(about = "Copy a range of cell values from one XLSX workbook into another", long_about = None)]
#[command(version)]
struct Cli {
    /// Workbook to copy from
    #[arg(allow_hyphen_values = true, value_name = "SOURCE.XLSX")]
    source: PathBuf,

    /// Sheet in the source workbook
    #[arg(allow_hyphen_values = true, value_name = "SrcSheet")]
    source_sheet: String,

    /// Source cells, e.g. A1:C10
    #[arg(allow_hyphen_values = true, value_name = "SrcRange")]
    source_range: String,

    /// Workbook to update in place; must already exist
    #[arg(allow_hyphen_values = true, value_name = "DEST.XLSX")]
    dest: PathBuf,

    /// Sheet in the destination workbook
    #[arg(allow_hyphen_values = true, value_name = "DestSheet")]
    dest_sheet: String,

    /// Destination cells, same number of cells as the source range
    #[arg(allow_hyphen_values = true, value_name = "DestRange")]
    dest_range: String,
}

fn main() -> ExitCode {
    cli::run::<Cli, _, _, _>(std::env::args_os(), 6, |cli| {
        let request = CopyRequest {
            source_path: cli.source,
            source_sheet: cli.source_sheet,
            source_range: cli.source_range,
            dest_path: cli.dest,
            dest_sheet: cli.dest_sheet,
            dest_range: cli.dest_range,
        };
        let copied = copy_range(&request)?;

        println!(
            "{} Copied {} cells into {}!{}",
            "✓".green().bold(),
            copied,
            request.dest_sheet,
            request.dest_range
        );
        Ok(())
    })
}
