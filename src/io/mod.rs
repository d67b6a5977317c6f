//! Writing fit summaries and draws to disk.

#[cfg(feature = "csv")]
pub mod csv;

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::fit::FitSummary;

/// Destination for human-readable fit summaries.
///
/// Each summary is written as one block followed by a blank line and flushed immediately.
/// Dropping the sink closes the underlying writer.
pub struct SummarySink<W: Write> {
    writer: W,
}

impl SummarySink<BufWriter<File>> {
    /// Opens `path` for appending, creating it if needed. Existing content is never truncated.
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }
}

impl<W: Write> SummarySink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_summary(&mut self, summary: &FitSummary) -> Result<()> {
        writeln!(self.writer, "{summary}")?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
