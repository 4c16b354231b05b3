pub mod document;
pub mod records;
pub mod rows;
pub mod tokens;

pub use document::parse_pdf;
pub use records::{GradeRecord, LETTERS};

use crate::db::{ParsedRow, PendingParse};
use crate::export;

/// Two-step pipeline: PDF → grade records → report CSV next to the PDF.
pub fn process_report(report: &PendingParse) -> ParsedRow {
    let csv_path = report.pdf_path.with_extension("csv");
    let result = parse_pdf(&report.pdf_path)
        .map_err(anyhow::Error::from)
        .and_then(|records| {
            export::write_report_csv(&csv_path, &records)?;
            Ok(records.len())
        });

    match result {
        Ok(count) => ParsedRow {
            download_id: report.download_id,
            csv_path: Some(csv_path),
            record_count: Some(count),
            error: None,
        },
        Err(e) => ParsedRow {
            download_id: report.download_id,
            csv_path: None,
            record_count: None,
            error: Some(format!("{:#}", e)),
        },
    }
}
