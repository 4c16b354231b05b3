use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::report::ReportName;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reports (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            filename   TEXT NOT NULL,
            term       TEXT NOT NULL,
            college    TEXT NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_reports_visited ON reports(visited);

        CREATE TABLE IF NOT EXISTS downloads (
            id            INTEGER PRIMARY KEY,
            report_id     INTEGER NOT NULL REFERENCES reports(id),
            filename      TEXT NOT NULL,
            path          TEXT,
            outcome       TEXT NOT NULL CHECK(outcome IN ('downloaded','cached','missing','error')),
            http_status   INTEGER,
            error         TEXT,
            latency_ms    INTEGER,
            downloaded_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_downloads_report ON downloads(report_id);

        CREATE TABLE IF NOT EXISTS parsed_reports (
            id           INTEGER PRIMARY KEY,
            download_id  INTEGER NOT NULL UNIQUE REFERENCES downloads(id),
            csv_path     TEXT,
            record_count INTEGER,
            error        TEXT,
            parsed_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Listing ──

pub fn insert_reports(conn: &Connection, reports: &[(String, ReportName)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO reports (url, filename, term, college) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (url, name) in reports {
            count += stmt.execute(rusqlite::params![
                url,
                name.filename(),
                name.term.to_string(),
                name.college,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Downloading ──

pub struct PendingReport {
    pub report_id: i64,
    pub url: String,
    pub filename: String,
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<PendingReport>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT id, url, filename FROM reports WHERE visited = 0 ORDER BY id LIMIT {}",
            n
        ),
        None => "SELECT id, url, filename FROM reports WHERE visited = 0 ORDER BY id".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PendingReport {
                report_id: row.get(0)?,
                url: row.get(1)?,
                filename: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Downloaded,
    Cached,
    /// The registrar answered 404: no report for that term and college.
    Missing,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Downloaded => "downloaded",
            Outcome::Cached => "cached",
            Outcome::Missing => "missing",
            Outcome::Error => "error",
        }
    }
}

pub struct DownloadRow {
    pub report_id: i64,
    pub filename: String,
    pub path: Option<PathBuf>,
    pub outcome: Outcome,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

/// Record one download attempt and mark its report visited.
pub fn save_download(conn: &Connection, row: &DownloadRow) -> Result<()> {
    let mut insert = conn.prepare_cached(
        "INSERT INTO downloads (report_id, filename, path, outcome, http_status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut update = conn.prepare_cached(
        "UPDATE reports SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
    )?;
    insert.execute(rusqlite::params![
        row.report_id,
        row.filename,
        row.path.as_ref().map(|p| p.to_string_lossy().to_string()),
        row.outcome.as_str(),
        row.http_status,
        row.error,
        row.latency_ms,
    ])?;
    update.execute(rusqlite::params![row.report_id])?;
    Ok(())
}

// ── Parsing ──

pub struct PendingParse {
    pub download_id: i64,
    pub filename: String,
    pub pdf_path: PathBuf,
}

pub fn fetch_unparsed(conn: &Connection, limit: Option<usize>) -> Result<Vec<PendingParse>> {
    let sql = format!(
        "SELECT d.id, d.filename, d.path
         FROM downloads d
         LEFT JOIN parsed_reports p ON p.download_id = d.id
         WHERE d.outcome IN ('downloaded', 'cached') AND d.path IS NOT NULL AND p.id IS NULL
         ORDER BY d.id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PendingParse {
                download_id: row.get(0)?,
                filename: row.get(1)?,
                pdf_path: PathBuf::from(row.get::<_, String>(2)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct ParsedRow {
    pub download_id: i64,
    pub csv_path: Option<PathBuf>,
    pub record_count: Option<usize>,
    pub error: Option<String>,
}

pub fn save_parsed(conn: &Connection, rows: &[ParsedRow]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO parsed_reports (download_id, csv_path, record_count, error)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in rows {
            stmt.execute(rusqlite::params![
                r.download_id,
                r.csv_path.as_ref().map(|p| p.to_string_lossy().to_string()),
                r.record_count.map(|n| n as i64),
                r.error,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Consolidation ──

/// Successfully written report CSVs as (filename, csv path), ordered by filename.
pub fn fetch_report_csvs(conn: &Connection) -> Result<Vec<(String, PathBuf)>> {
    let mut stmt = conn.prepare(
        "SELECT d.filename, p.csv_path
         FROM parsed_reports p
         JOIN downloads d ON d.id = p.download_id
         WHERE p.error IS NULL AND p.csv_path IS NOT NULL
         ORDER BY d.filename",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, PathBuf::from(row.get::<_, String>(1)?)))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub downloaded: usize,
    pub missing: usize,
    pub errors: usize,
    pub parsed: usize,
    pub parse_errors: usize,
    pub records: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let total = count("SELECT COUNT(*) FROM reports")?;
    let visited = count("SELECT COUNT(*) FROM reports WHERE visited = 1")?;
    Ok(Stats {
        total,
        visited,
        unvisited: total - visited,
        downloaded: count(
            "SELECT COUNT(*) FROM downloads WHERE outcome IN ('downloaded', 'cached')",
        )?,
        missing: count("SELECT COUNT(*) FROM downloads WHERE outcome = 'missing'")?,
        errors: count("SELECT COUNT(*) FROM downloads WHERE outcome = 'error'")?,
        parsed: count("SELECT COUNT(*) FROM parsed_reports WHERE error IS NULL")?,
        parse_errors: count("SELECT COUNT(*) FROM parsed_reports WHERE error IS NOT NULL")?,
        records: count("SELECT COALESCE(SUM(record_count), 0) FROM parsed_reports")?,
    })
}
