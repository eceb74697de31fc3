//! Rendering results to an output sink.
//!
//! Text output is a tab-joined header, a dashed separator, and one
//! tab-joined line per row. JSON output is one object per row.

use std::io::Write;

use futures::{Stream, TryStreamExt};

use crate::error::Result;
use crate::insert::InsertSummary;
use crate::results::ResultRow;
use crate::warehouse::DmlStats;

const SEPARATOR_WIDTH: usize = 84;

/// Output format for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Tab-separated lines under a header.
    #[default]
    Text,
    /// One JSON object per line, keyed by column.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// Writes reports to a sink.
pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Consumes the reporter and returns the sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Writes every row from `rows` and returns the number of data lines.
    ///
    /// A failed row stops the report; lines already written stay written.
    pub async fn emit<S>(&mut self, rows: S, columns: &[String]) -> Result<usize>
    where
        S: Stream<Item = Result<ResultRow>> + Unpin,
    {
        let mut rows = rows;
        let mut count = 0;

        if self.format == OutputFormat::Text {
            writeln!(self.out, "{}", columns.join("\t"))?;
            writeln!(self.out, "{}", "-".repeat(SEPARATOR_WIDTH))?;
        }

        while let Some(row) = rows.try_next().await? {
            self.write_row(&row)?;
            count += 1;
        }

        self.out.flush()?;
        Ok(count)
    }

    fn write_row(&mut self, row: &ResultRow) -> Result<()> {
        match self.format {
            OutputFormat::Text => {
                let line = row
                    .values()
                    .map(|value| value.to_display_string())
                    .collect::<Vec<_>>()
                    .join("\t");
                writeln!(self.out, "{line}")?;
            }
            OutputFormat::Json => {
                let object: serde_json::Map<String, serde_json::Value> = row
                    .columns()
                    .zip(row.values())
                    .map(|(name, value)| {
                        serde_json::to_value(value).map(|v| (name.to_string(), v))
                    })
                    .collect::<std::result::Result<_, _>>()
                    .map_err(std::io::Error::from)?;
                serde_json::to_writer(&mut self.out, &object).map_err(std::io::Error::from)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    /// Reports the row counts of a DML job.
    pub fn emit_dml(&mut self, stats: &DmlStats) -> Result<()> {
        match self.format {
            OutputFormat::Text => {
                let counts = [
                    (stats.inserted_row_count, "inserted"),
                    (stats.updated_row_count, "updated"),
                    (stats.deleted_row_count, "deleted"),
                ];
                let mut wrote = false;
                for (count, verb) in counts.iter().filter(|(count, _)| *count != 0) {
                    writeln!(self.out, "{count} rows {verb}")?;
                    wrote = true;
                }
                if !wrote {
                    writeln!(self.out, "0 rows affected")?;
                }
            }
            OutputFormat::Json => {
                let object = serde_json::json!({
                    "inserted": stats.inserted_row_count,
                    "updated": stats.updated_row_count,
                    "deleted": stats.deleted_row_count,
                });
                writeln!(self.out, "{object}")?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    /// Reports a streaming insert: success, or one line per rejected row.
    pub fn emit_insert_summary(&mut self, summary: &InsertSummary) -> Result<()> {
        match self.format {
            OutputFormat::Text => {
                if summary.is_success() {
                    writeln!(self.out, "inserted successfully")?;
                } else {
                    for row in &summary.row_errors {
                        writeln!(
                            self.out,
                            "error in entry {}: {}",
                            row.index,
                            row.messages.join("; ")
                        )?;
                    }
                }
            }
            OutputFormat::Json => {
                let object = serde_json::json!({
                    "table": summary.table.qualified_name(),
                    "attempted": summary.attempted,
                    "errors": summary
                        .row_errors
                        .iter()
                        .map(|row| {
                            serde_json::json!({"index": row.index, "messages": row.messages})
                        })
                        .collect::<Vec<_>>(),
                });
                writeln!(self.out, "{object}")?;
            }
        }
        self.out.flush()?;
        Ok(())
    }
}
