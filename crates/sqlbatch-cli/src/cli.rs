//! sqlbatch - run SQL statements against a SQLite database as one transaction

mod args;
mod exitcode;
mod logging;

use std::error::Error;
use std::io::{BufWriter, Write};
use std::process::ExitCode;
use std::time::Instant;

use clap::{ArgMatches, FromArgMatches};
use sqlbatch_core::{DatabaseDriver, Result, SqlBatchError};
use sqlbatch_driver_sqlite::SqliteDriver;
use sqlbatch_query::{BatchExecutor, BatchOptions, ConsoleReporter, Deadline};

use crate::args::Cli;
use crate::logging::LoggingConfig;

// a second worker runs the deadline watchdog while a statement blocks the first
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let started_at = Instant::now();
    let driver = SqliteDriver::new();
    let argv = args::normalize_legacy_flags(std::env::args_os());

    let matches = match Cli::command_with_features(&driver.compiled_features()).try_get_matches_from(argv) {
        Ok(matches) => matches,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { exitcode::USAGE } else { exitcode::OK });
        }
    };
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(exitcode::USAGE);
        }
    };

    if let Err(e) = logging::init(LoggingConfig::from_verbosity(cli.verbose, cli.log_format)) {
        eprintln!("error: failed to initialize logging: {e:#}");
        return ExitCode::from(exitcode::SOFTWARE);
    }

    match run(&driver, cli, &matches, started_at).await {
        Ok(()) => ExitCode::from(exitcode::OK),
        Err(e) => {
            report_error(&e);
            ExitCode::from(exitcode::for_error(&e))
        }
    }
}

async fn run(driver: &SqliteDriver, cli: Cli, matches: &ArgMatches, started_at: Instant) -> Result<()> {
    let sequence = args::build_sequence(args::declarations(matches))?;
    tracing::debug!(calls = sequence.len(), "command line parsed");

    if cli.dry_run {
        let mut out = std::io::stdout().lock();
        for (index, call) in sequence.iter().enumerate() {
            writeln!(out, "{}. {}", index + 1, call)?;
        }
        return Ok(());
    }

    let config = cli.connection_config()?;

    let conn = driver.connect(&config).await?;
    let options = BatchOptions::new()
        .with_deadline(Deadline::starting_at(started_at, cli.deadline()))
        .with_behavior(cli.transaction);
    let mut reporter = ConsoleReporter::new(BufWriter::new(std::io::stdout()), cli.format);

    let outcome = BatchExecutor::new(options)
        .execute(&conn, sequence, &mut reporter)
        .await;
    reporter.into_inner().flush()?;

    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "failed to close connection");
    }

    let report = outcome?;
    tracing::info!(
        driver = driver.name(),
        calls = report.call_count(),
        affected_rows = report.total_affected_rows(),
        elapsed = ?report.elapsed,
        "batch finished"
    );
    Ok(())
}

fn report_error(error: &SqlBatchError) {
    tracing::debug!(error = %error, kind = ?error.kind(), "batch failed");
    eprint!("{}", describe_error(error));
}

/// The error followed by one `caused by` line per source
fn describe_error(error: &SqlBatchError) -> String {
    let mut text = format!("error: {error}\n");
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(&format!("  caused by: {cause}\n"));
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlbatch_core::BoundArgument;

    #[test]
    fn test_describe_error_prints_each_cause_once() {
        let err = BoundArgument::parse("n=99999999999999999999:integer").unwrap_err();
        assert_eq!(
            describe_error(&err),
            "error: parsing SQL argument \"99999999999999999999\" as integer\n  \
             caused by: number too large to fit in target type\n"
        );
    }

    #[test]
    fn test_describe_error_without_source() {
        let err = SqlBatchError::Statement("no such table: users".into());
        assert_eq!(describe_error(&err), "error: statement failed: no such table: users\n");
    }
}
