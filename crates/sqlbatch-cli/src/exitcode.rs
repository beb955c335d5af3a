//! Process exit codes (BSD sysexits.h compatible)

use sqlbatch_core::{ErrorKind, SqlBatchError};

/// Successful termination
pub const OK: u8 = 0;

/// Any execution failure without a more specific code
pub const FAILURE: u8 = 1;

/// Command line usage error
pub const USAGE: u8 = 64;

/// Cannot open input
pub const NOINPUT: u8 = 66;

/// Internal software error
pub const SOFTWARE: u8 = 70;

/// Input/output error
pub const IOERR: u8 = 74;

/// Configuration error
pub const CONFIG: u8 = 78;

/// Exit code reported for a failed run
pub fn for_error(error: &SqlBatchError) -> u8 {
    match error.kind() {
        ErrorKind::ArgumentSyntax | ErrorKind::ArgumentValue | ErrorKind::DanglingArgument => USAGE,
        ErrorKind::Configuration => CONFIG,
        ErrorKind::Connection => NOINPUT,
        ErrorKind::Io => IOERR,
        ErrorKind::Transaction | ErrorKind::Statement | ErrorKind::Render => FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SqlBatchError::DanglingArgument, USAGE)]
    #[case(SqlBatchError::UnknownArgumentType("date".into()), USAGE)]
    #[case(SqlBatchError::Configuration("no database".into()), CONFIG)]
    #[case(SqlBatchError::Connection("unable to open".into()), NOINPUT)]
    #[case(SqlBatchError::Commit("locked".into()), FAILURE)]
    #[case(SqlBatchError::Cancelled("deadline".into()), FAILURE)]
    #[case(SqlBatchError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)), IOERR)]
    fn test_for_error(#[case] error: SqlBatchError, #[case] expected: u8) {
        assert_eq!(for_error(&error), expected);
    }
}
