//! CSV trajectory output: a `time,<node ids...>` header, then one row per
//! recorded sample with the time to 4 and values to 6 decimals.

use gssk_core::Recorder;
use std::io::{self, Write};

/// Streams samples to `out` as they are recorded, so a run that fails part
/// way still leaves every accepted row on disk.
pub struct CsvRecorder<W: Write> {
    out: W,
    rows: usize,
    error: Option<io::Error>,
}

impl<W: Write> CsvRecorder<W> {
    pub fn new(mut out: W, node_ids: &[String]) -> io::Result<Self> {
        write!(out, "time")?;
        for id in node_ids {
            write!(out, ",{}", id)?;
        }
        writeln!(out)?;
        Ok(Self {
            out,
            rows: 0,
            error: None,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes the writer, surfacing the first write error hit while recording.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> Recorder for CsvRecorder<W> {
    fn record(&mut self, t: f64, values: &[f64]) {
        if self.error.is_some() {
            return;
        }
        match write_row(&mut self.out, t, values) {
            Ok(()) => self.rows += 1,
            Err(err) => self.error = Some(err),
        }
    }
}

fn write_row<W: Write>(out: &mut W, t: f64, values: &[f64]) -> io::Result<()> {
    write!(out, "{:.4}", t)?;
    for value in values {
        write!(out, ",{:.6}", value)?;
    }
    writeln!(out)
}
