use crate::record::NormalizedRecord;
use prettytable::{Cell, Row, Table};
use std::io::{self, Write};

pub const COLUMNS: [&str; 7] = [
    "TYPE",
    "URL",
    "MODIFIED TIME",
    "ACCESS TIME",
    "FILENAME",
    "DIRECTORY",
    "HTTP HEADERS",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// Header line, then one line per record, fields joined by the delimiter.
    Delimited(String),
    /// One JSON object per line.
    JsonLines,
    /// A single prettytable once every record is read.
    Table,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Delimited("\t".to_string())
    }
}

pub fn header_line(delimiter: &str) -> String {
    COLUMNS.join(delimiter)
}

pub fn record_line(record: &NormalizedRecord, delimiter: &str) -> String {
    record.fields().join(delimiter)
}

/// Write `records` to `out`, returning how many were written.
///
/// Unknown records are dropped unless `keep_unknown` is set, in which case
/// they come out as empty rows.
pub fn write_records<W, I>(
    out: &mut W,
    records: I,
    format: &OutputFormat,
    keep_unknown: bool,
) -> io::Result<usize>
where
    W: Write,
    I: IntoIterator<Item = NormalizedRecord>,
{
    let records = records
        .into_iter()
        .filter(|r| keep_unknown || !r.is_unknown());
    let mut written = 0;
    match format {
        OutputFormat::Delimited(delim) => {
            writeln!(out, "{}", header_line(delim))?;
            for r in records {
                writeln!(out, "{}", record_line(&r, delim))?;
                written += 1;
            }
        }
        OutputFormat::JsonLines => {
            for r in records {
                writeln!(out, "{}", r.to_json())?;
                written += 1;
            }
        }
        OutputFormat::Table => {
            let mut t = Table::new();
            t.set_titles(Row::new(COLUMNS.iter().map(|c| Cell::new(c)).collect()));
            for r in records {
                t.add_row(Row::new(r.fields().iter().map(|f| Cell::new(f)).collect()));
                written += 1;
            }
            t.print(out)?;
        }
    }
    out.flush()?;
    Ok(written)
}
