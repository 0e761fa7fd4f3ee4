//! Plumbing shared by the command line tools

use crate::error::ValidationError;
use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use colored::Colorize;
use std::ffi::OsString;
use std::process::ExitCode;

/// Log to stderr at `warn` unless `RUST_LOG` says otherwise
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("warn");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}

/// Parse positional arguments into `C`.
///
/// `--help` and `--version` print and exit as usual. Any other parse failure
/// is a wrong number of arguments, since every argument is a plain string.
pub fn parse_args<C, I, T>(args: I, expected: usize) -> Result<C, ValidationError>
where
    C: Parser,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    C::try_parse_from(args).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => e.exit(),
        _ => {
            log::debug!("argument parsing failed: {}", e);
            ValidationError::ArgumentCount { expected }
        }
    })
}

/// Format an error the way the tools print it; validation errors carry the usage
pub fn error_message<C: CommandFactory>(error: &anyhow::Error) -> String {
    let mut message = format!("\n{} : {:#}", "ERROR".red().bold(), error);
    if error.downcast_ref::<ValidationError>().is_some() {
        message.push('\n');
        message.push_str(&C::command().render_usage().to_string());
    }
    message
}

/// Parse `args`, run `op`, and map the outcome to an exit code.
/// Failures are printed to stderr.
pub fn run<C, I, T, F>(args: I, expected: usize, op: F) -> ExitCode
where
    C: Parser,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: FnOnce(C) -> Result<()>,
{
    init_logging();

    match execute::<C, _, _, _>(args, expected, op) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

/// Parse `args` and run `op`; a failure comes back as the message to print
pub fn execute<C, I, T, F>(args: I, expected: usize, op: F) -> Result<(), String>
where
    C: Parser,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: FnOnce(C) -> Result<()>,
{
    parse_args::<C, _, _>(args, expected)
        .map_err(anyhow::Error::from)
        .and_then(op)
        .map_err(|e| error_message::<C>(&e))
}
