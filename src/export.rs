use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::parser::{GradeRecord, LETTERS};
use crate::report::{ReportName, TermCode};

const ID_COLUMNS: [&str; 4] = ["DEPT", "COURSE_NUM", "SECTION_NUM", "INSTRUCTOR_NAME"];

fn header() -> impl Iterator<Item = &'static str> {
    LETTERS.into_iter().chain(ID_COLUMNS)
}

/// Write the 14-column header and one row per record.
pub fn write_records<W: Write>(out: W, records: &[GradeRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(header())?;
    for record in records {
        writer.write_record(record.fields())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_report_csv(path: &Path, records: &[GradeRecord]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_records(file, records)
}

pub struct TermSummary {
    pub term: TermCode,
    pub path: PathBuf,
    pub reports: usize,
    pub rows: usize,
}

/// Group report CSVs by the term encoded in their report filename.
/// Files whose name is not a report name are skipped.
pub fn group_by_term(reports: &[(String, PathBuf)]) -> BTreeMap<TermCode, Vec<PathBuf>> {
    let mut groups: BTreeMap<TermCode, Vec<(String, PathBuf)>> = BTreeMap::new();
    for (filename, path) in reports {
        match ReportName::parse(filename) {
            Some(name) => groups
                .entry(name.term)
                .or_default()
                .push((filename.clone(), path.clone())),
            None => warn!("Skipping {}: not a report filename", filename),
        }
    }
    groups
        .into_iter()
        .map(|(term, mut files)| {
            files.sort();
            (term, files.into_iter().map(|(_, p)| p).collect())
        })
        .collect()
}

/// Concatenate report CSVs into one `<term>.csv` per term under `out_dir`.
pub fn consolidate_terms(reports: &[(String, PathBuf)], out_dir: &Path) -> Result<Vec<TermSummary>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut summaries = Vec::new();
    for (term, inputs) in group_by_term(reports) {
        let path = out_dir.join(format!("{}.csv", term));
        let file =
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(header())?;

        let mut rows = 0;
        for input in &inputs {
            rows += append_rows(input, &mut writer)?;
        }
        writer.flush()?;

        info!("Term {}: {} reports, {} rows -> {}", term, inputs.len(), rows, path.display());
        summaries.push(TermSummary {
            term,
            path,
            reports: inputs.len(),
            rows,
        });
    }
    Ok(summaries)
}

fn append_rows<W: Write>(input: &Path, writer: &mut csv::Writer<W>) -> Result<usize> {
    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let mut rows = 0;
    for record in reader.records() {
        let record = record.with_context(|| format!("bad row in {}", input.display()))?;
        writer.write_record(&record)?;
        rows += 1;
    }
    Ok(rows)
}
