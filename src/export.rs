//! Writers that hand page records to spreadsheets and other tools.
//!
//! Both formats carry the same four columns, in record order: URL, Last
//! Modified, Change Frequency and Priority. Missing optional values become
//! empty cells (CSV) or `null` (JSON).

use std::borrow::Cow;
use std::io::{self, Write};

use crate::sitemap::PageRecord;

const CSV_HEADER: [&str; 4] = ["URL", "Last Modified", "Change Frequency", "Priority"];

/// Writes records as RFC 4180 CSV with a header row and CRLF line endings.
///
/// Cells come from a remote site, so any that a spreadsheet would evaluate as
/// a formula (leading `=`, `+`, `-`, `@`, tab or CR) are prefixed with `'`.
pub fn write_csv<W: Write>(records: &[PageRecord], mut writer: W) -> io::Result<()> {
    write_csv_row(&mut writer, CSV_HEADER)?;
    for record in records {
        write_csv_row(
            &mut writer,
            [
                &*neutralize_formula(record.location()),
                &*neutralize_formula(record.last_modified().unwrap_or("")),
                &*neutralize_formula(record.change_frequency().unwrap_or("")),
                &*neutralize_formula(record.priority().unwrap_or("")),
            ],
        )?;
    }
    writer.flush()
}

/// Writes records as a pretty-printed JSON array.
pub fn write_json<W: Write>(records: &[PageRecord], mut writer: W) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn neutralize_formula(cell: &str) -> Cow<'_, str> {
    if cell.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        Cow::Owned(format!("'{cell}"))
    } else {
        Cow::Borrowed(cell)
    }
}

fn write_csv_row<W: Write>(writer: &mut W, cells: [&str; 4]) -> io::Result<()> {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            writer.write_all(b",")?;
        }
        if cell.contains([',', '"', '\r', '\n']) {
            write!(writer, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            writer.write_all(cell.as_bytes())?;
        }
    }
    writer.write_all(b"\r\n")
}
