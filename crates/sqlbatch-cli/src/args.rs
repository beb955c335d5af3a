//! Command line definition and declaration-order recovery

use std::ffi::OsString;
use std::str::FromStr;
use std::time::Duration;

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{ArgAction, ArgMatches, Command, CommandFactory, Parser};
use sqlbatch_core::{
    ArgumentType, CallSequence, CallSequenceBuilder, ConnectionConfig, Result, TransactionBehavior,
};
use sqlbatch_query::OutputFormat;
use strum::VariantNames;

use crate::logging::LogFormat;

/// Long flags that may also be spelled with a single dash
const LEGACY_FLAGS: &[&str] = &[
    "db",
    "query",
    "exec",
    "arg",
    "list",
    "help",
    "timeout",
    "transaction",
    "format",
    "read-only",
    "busy-timeout",
    "dry-run",
    "log-format",
];

/// Long flags whose value may follow as the next token
const VALUE_FLAGS: &[&str] = &[
    "db",
    "query",
    "exec",
    "arg",
    "timeout",
    "transaction",
    "format",
    "busy-timeout",
    "log-format",
];

const EXAMPLE: &str = "sqlbatch --db app.db \\\n    --query \"SELECT name FROM users WHERE id=@user_id\" --arg user_id=100500:integer \\\n    --exec \"DELETE FROM users WHERE name like ?\" --arg '%spam%'";

/// Run SQL statements against a SQLite database as one transaction
#[derive(Parser, Debug, Clone)]
#[command(name = "sqlbatch", version)]
pub struct Cli {
    /// Database file to open
    #[arg(long, env = "SQLBATCH_DB", value_name = "PATH")]
    pub db: Option<String>,

    /// Declare a query call; its result set is printed
    #[arg(long = "query", value_name = "SQL", allow_hyphen_values = true, action = ArgAction::Append)]
    pub queries: Vec<String>,

    /// Declare an exec call; its affected row count is printed
    #[arg(long = "exec", value_name = "SQL", allow_hyphen_values = true, action = ArgAction::Append)]
    pub execs: Vec<String>,

    /// Bind an argument to the most recent call: [name=]value[:type]
    #[arg(long = "arg", value_name = "SPEC", allow_hyphen_values = true, action = ArgAction::Append)]
    pub args: Vec<String>,

    /// Declare a query listing the tables of the database
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_name = "BOOL",
        action = ArgAction::Append,
        value_parser = clap::value_parser!(bool)
    )]
    pub list: Vec<bool>,

    /// Time budget for the whole invocation, counted from process start
    #[arg(long, env = "SQLBATCH_TIMEOUT", value_name = "SECONDS", default_value_t = 300)]
    pub timeout: u64,

    /// How the batch transaction takes its locks
    #[arg(
        long,
        value_name = "MODE",
        default_value_t = TransactionBehavior::Deferred,
        value_parser = strum_parser::<TransactionBehavior>(TransactionBehavior::VARIANTS)
    )]
    pub transaction: TransactionBehavior,

    /// Result set output format
    #[arg(
        long,
        env = "SQLBATCH_FORMAT",
        default_value_t = OutputFormat::Table,
        value_parser = strum_parser::<OutputFormat>(OutputFormat::VARIANTS)
    )]
    pub format: OutputFormat,

    /// Open the database read-only
    #[arg(long)]
    pub read_only: bool,

    /// Wait this long for a locked database before failing
    #[arg(long, value_name = "MS")]
    pub busy_timeout: Option<u64>,

    /// Print the parsed calls without opening the database
    #[arg(long)]
    pub dry_run: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log line format
    #[arg(
        long,
        value_name = "FORMAT",
        default_value_t = LogFormat::Compact,
        value_parser = strum_parser::<LogFormat>(LogFormat::VARIANTS)
    )]
    pub log_format: LogFormat,
}

impl Cli {
    /// The clap command with the help epilogue filled in
    pub fn command_with_features(features: &[String]) -> Command {
        Self::command().after_help(help_epilogue(features))
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Connection settings; fails when no database was given
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let mut config =
            ConnectionConfig::new(self.db.clone().unwrap_or_default()).with_read_only(self.read_only);
        if let Some(ms) = self.busy_timeout {
            config = config.with_busy_timeout(Duration::from_millis(ms));
        }
        config.validate()?;
        Ok(config)
    }
}

fn strum_parser<T>(variants: &'static [&'static str]) -> impl TypedValueParser<Value = T>
where
    T: FromStr + Clone + Send + Sync + 'static,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    PossibleValuesParser::new(variants.iter().copied()).try_map(|value| value.parse::<T>())
}

fn help_epilogue(features: &[String]) -> String {
    let mut help = format!(
        "Example:\n  {EXAMPLE}\n\nArgument spec: [name=]value[:type]\nSupported argument types: {}\n",
        ArgumentType::VARIANTS.join(", ")
    );
    if !features.is_empty() {
        help.push_str("\nCompiled-in SQLite features:\n");
        for feature in features {
            help.push_str("  ");
            help.push_str(feature);
            help.push('\n');
        }
    }
    help
}

/// One statement-building flag, in command line order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Query(String),
    Exec(String),
    Argument(String),
    List,
}

/// Recover the order in which `--query`, `--exec`, `--arg` and `--list`
/// were given
pub fn declarations(matches: &ArgMatches) -> Vec<Declaration> {
    let mut ordered: Vec<(usize, Declaration)> = Vec::new();
    ordered.extend(indexed::<String>(matches, "queries").map(|(i, s)| (i, Declaration::Query(s))));
    ordered.extend(indexed::<String>(matches, "execs").map(|(i, s)| (i, Declaration::Exec(s))));
    ordered.extend(indexed::<String>(matches, "args").map(|(i, s)| (i, Declaration::Argument(s))));
    ordered.extend(
        indexed::<bool>(matches, "list")
            .filter(|(_, enabled)| *enabled)
            .map(|(i, _)| (i, Declaration::List)),
    );
    ordered.sort_by_key(|(index, _)| *index);
    ordered.into_iter().map(|(_, declaration)| declaration).collect()
}

fn indexed<T: Clone + Send + Sync + 'static>(
    matches: &ArgMatches,
    id: &str,
) -> impl Iterator<Item = (usize, T)> {
    let indices: Vec<usize> = matches.indices_of(id).map(Iterator::collect).unwrap_or_default();
    let values: Vec<T> = matches
        .get_many::<T>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    indices.into_iter().zip(values)
}

/// Replay declarations into a call sequence
pub fn build_sequence(declarations: Vec<Declaration>) -> Result<CallSequence> {
    let mut builder = CallSequenceBuilder::new();
    for declaration in declarations {
        match declaration {
            Declaration::Query(statement) => {
                builder.query(&statement);
            }
            Declaration::Exec(statement) => {
                builder.exec(&statement);
            }
            Declaration::Argument(raw) => builder.argument(&raw)?,
            Declaration::List => builder.list(),
        }
    }
    Ok(builder.build())
}

/// Rewrite single-dash long flags (`-db`, `-query=...`) to their
/// double-dash form. Tokens in value position are left untouched.
pub fn normalize_legacy_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();
    let mut normalized: Vec<OsString> = args.next().into_iter().collect();
    let mut value_expected = false;

    while let Some(arg) = args.next() {
        if value_expected {
            value_expected = false;
            normalized.push(arg);
            continue;
        }

        let Some(text) = arg.to_str() else {
            normalized.push(arg);
            continue;
        };

        if text == "--" {
            normalized.push(arg);
            normalized.extend(args.by_ref());
            break;
        }

        if let Some(long) = text.strip_prefix("--") {
            value_expected = VALUE_FLAGS.contains(&long);
            normalized.push(arg);
            continue;
        }

        if let Some(short) = text.strip_prefix('-') {
            let (name, inline_value) = match short.split_once('=') {
                Some((name, _)) => (name, true),
                None => (short, false),
            };
            if LEGACY_FLAGS.contains(&name) {
                value_expected = !inline_value && VALUE_FLAGS.contains(&name);
                normalized.push(format!("-{text}").into());
                continue;
            }
        }

        normalized.push(arg);
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::FromArgMatches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use sqlbatch_core::{BoundArgument, CallKind, LIST_TABLES_STATEMENT, SqlBatchError, Value};

    fn argv(args: &[&str]) -> Vec<OsString> {
        std::iter::once("sqlbatch")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    fn parse(args: &[&str]) -> (Cli, ArgMatches) {
        let matches = Cli::command_with_features(&[])
            .try_get_matches_from(normalize_legacy_flags(argv(args)))
            .unwrap();
        let cli = Cli::from_arg_matches(&matches).unwrap();
        (cli, matches)
    }

    fn sequence(args: &[&str]) -> Result<CallSequence> {
        let (_, matches) = parse(args);
        build_sequence(declarations(&matches))
    }

    #[test]
    fn test_legacy_scenario() {
        let sequence = sequence(&[
            "-db",
            "app.db",
            "-query",
            "SELECT name FROM users WHERE id=@user_id",
            "-arg",
            "user_id=100500:integer",
            "-exec",
            "DELETE FROM users WHERE name like ?",
            "-arg",
            "%spam%",
        ])
        .unwrap();

        assert_eq!(sequence.len(), 2);
        let query = sequence.get(0).unwrap();
        assert_eq!(query.kind(), CallKind::Query);
        assert_eq!(
            query.arguments(),
            &[BoundArgument::named("user_id", Value::Integer(100500))]
        );
        let exec = sequence.get(1).unwrap();
        assert_eq!(exec.kind(), CallKind::Exec);
        assert_eq!(
            exec.arguments(),
            &[BoundArgument::positional(Value::Text("%spam%".into()))]
        );
    }

    #[test]
    fn test_interleaved_order_is_kept() {
        let sequence = sequence(&[
            "--exec",
            "CREATE TABLE t (x)",
            "--list",
            "--query",
            "SELECT ?",
            "--arg",
            "1:integer",
            "--exec=INSERT INTO t VALUES (?)",
            "--arg=2:real",
            "--list=false",
        ])
        .unwrap();

        let statements: Vec<(CallKind, &str, usize)> = sequence
            .iter()
            .map(|c| (c.kind(), c.statement(), c.arguments().len()))
            .collect();
        assert_eq!(
            statements,
            vec![
                (CallKind::Exec, "CREATE TABLE t (x)", 0),
                (CallKind::Query, LIST_TABLES_STATEMENT, 0),
                (CallKind::Query, "SELECT ?", 1),
                (CallKind::Exec, "INSERT INTO t VALUES (?)", 1),
            ]
        );
    }

    #[test]
    fn test_list_alone() {
        let sequence = sequence(&["-list"]).unwrap();
        assert_eq!(sequence.len(), 1);
        assert_eq!(sequence.get(0).unwrap().statement(), LIST_TABLES_STATEMENT);
        assert!(sequence.get(0).unwrap().arguments().is_empty());
    }

    #[test]
    fn test_argument_before_any_call() {
        let err = sequence(&["--arg", "10:integer", "--query", "SELECT ?"]).unwrap_err();
        assert!(matches!(err, SqlBatchError::DanglingArgument));
    }

    #[test]
    fn test_blank_query_is_dropped() {
        let sequence = sequence(&["--query", "", "--query", "   "]).unwrap();
        assert!(sequence.is_empty());
    }

    #[test]
    fn test_hyphenated_values() {
        let sequence = sequence(&["--query", "SELECT ?", "--arg", "-5:integer"]).unwrap();
        assert_eq!(
            sequence.get(0).unwrap().arguments(),
            &[BoundArgument::positional(Value::Integer(-5))]
        );
    }

    #[test]
    fn test_options() {
        let (cli, _) = parse(&[
            "--db",
            "x.db",
            "--format",
            "json",
            "--transaction",
            "immediate",
            "--timeout",
            "5",
            "--busy-timeout",
            "250",
            "--read-only",
            "-vv",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.transaction, TransactionBehavior::Immediate);
        assert_eq!(cli.deadline(), Duration::from_secs(5));
        assert_eq!(cli.verbose, 2);

        let config = cli.connection_config().unwrap();
        assert_eq!(config.path, "x.db");
        assert!(config.read_only);
        assert_eq!(config.busy_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_format_is_usage_error() {
        let result = Cli::command_with_features(&[])
            .try_get_matches_from(argv(&["--format", "xml"]));
        assert!(result.is_err());
    }

    #[rstest]
    #[case(&[])]
    #[case(&["--db", ""])]
    #[case(&["--db", "   "])]
    fn test_missing_database(#[case] args: &[&str]) {
        // SQLBATCH_DB must not leak in from the environment here
        let (mut cli, _) = parse(args);
        if args.is_empty() {
            cli.db = None;
        }
        assert!(matches!(
            cli.connection_config(),
            Err(SqlBatchError::Configuration(_))
        ));
    }

    #[rstest]
    #[case(&["-db", "a.db"], &["--db", "a.db"])]
    #[case(&["-db=a.db"], &["--db=a.db"])]
    #[case(&["-query", "-exec"], &["--query", "-exec"])]
    #[case(&["--arg", "-list"], &["--arg", "-list"])]
    #[case(&["-list", "-v"], &["--list", "-v"])]
    #[case(&["-list=false"], &["--list=false"])]
    #[case(&["-vv", "-h"], &["-vv", "-h"])]
    #[case(&["--", "-db"], &["--", "-db"])]
    fn test_normalize_legacy_flags(#[case] input: &[&str], #[case] expected: &[&str]) {
        assert_eq!(normalize_legacy_flags(argv(input)), argv(expected));
    }

    #[test]
    fn test_help_lists_types_and_features() {
        let help = Cli::command_with_features(&["SQLite 3.46.0".to_string(), "THREADSAFE=1".to_string()])
            .render_long_help()
            .to_string();
        assert!(help.contains("--query \"SELECT name FROM users WHERE id=@user_id\""));
        assert!(help.contains("null, integer, real, text, blob"));
        assert!(help.contains("THREADSAFE=1"));
    }
}
