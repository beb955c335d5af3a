//! Line-oriented console output for a running batch

use std::io::Write;

use sqlbatch_core::{Call, Result, ResultSink, RowStream};

use crate::{BatchReporter, OutputFormat, render_rows};

/// Streams each call's outcome to a writer as soon as it is known.
///
/// Every call is announced as `> <statement>`. Exec calls are followed by
/// `rows affected: <n>` and query calls by their rendered result.
pub struct ConsoleReporter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ResultSink for ConsoleReporter<W> {
    fn consume(&mut self, columns: &[String], rows: &mut RowStream<'_>) -> Result<u64> {
        let rendered = render_rows(&mut self.out, self.format, columns, rows);
        // flush whatever made it out, even when rendering failed part way
        self.out.flush()?;
        rendered
    }
}

impl<W: Write + Send> BatchReporter for ConsoleReporter<W> {
    fn call_started(&mut self, _index: usize, call: &Call) -> Result<()> {
        writeln!(self.out, "> {}", call.statement())?;
        Ok(())
    }

    fn rows_affected(&mut self, _index: usize, _call: &Call, rows: u64) -> Result<()> {
        writeln!(self.out, "rows affected: {}", rows)?;
        self.out.flush()?;
        Ok(())
    }
}
