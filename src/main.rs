mod db;
mod downloader;
mod export;
mod listing;
mod parser;
mod report;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;

use settings::Settings;

#[derive(Parser)]
#[command(name = "grade_harvester", about = "Registrar grade distribution harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the listing page and queue every report URL
    Init {
        /// Only queue reports from this year on
        #[arg(long)]
        since: Option<u16>,
    },
    /// Download queued reports into the PDF cache
    Download {
        /// Max reports to download (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Parse downloaded PDFs into per-report CSVs
    Parse {
        /// Max reports to parse (default: all unparsed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Merge per-report CSVs into one CSV per term
    Consolidate,
    /// Download + parse + consolidate in one pipeline
    Run {
        /// Max reports to download+parse
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Parse a single PDF without touching the ledger
    Extract {
        pdf: PathBuf,
        /// Write CSV here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show harvesting statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Init { since } => {
            let conn = db::connect(&settings.db_path())?;
            db::init_schema(&conn)?;
            let client = downloader::build_client(&settings)?;
            let mut listing = listing::fetch_listing(&client, &settings.root_url).await?;
            if let Some(since) = since {
                listing.years.retain(|&y| y >= since);
            }
            let targets = listing::report_targets(&listing, &settings.pdf_base_url);
            let inserted = db::insert_reports(&conn, &targets)?;
            println!(
                "Queued {} new report URLs ({} total for {} years x 3 semesters x {} colleges)",
                inserted,
                targets.len(),
                listing.years.len(),
                listing.colleges.len()
            );
            Ok(())
        }
        Commands::Download { limit } => {
            let conn = db::connect(&settings.db_path())?;
            db::init_schema(&conn)?;
            let reports = db::fetch_unvisited(&conn, limit)?;
            if reports.is_empty() {
                println!("No unvisited reports. Run 'init' first or all reports are downloaded.");
                return Ok(());
            }
            println!("Downloading {} reports...", reports.len());
            let client = downloader::build_client(&settings)?;
            let stats =
                downloader::download_reports_streaming(&conn, client, &settings, reports).await?;
            print_download_stats(&stats);
            Ok(())
        }
        Commands::Parse { limit } => {
            let conn = db::connect(&settings.db_path())?;
            db::init_schema(&conn)?;
            let reports = db::fetch_unparsed(&conn, limit)?;
            if reports.is_empty() {
                println!("No unparsed reports. Run 'download' first.");
                return Ok(());
            }
            println!("Parsing {} reports...", reports.len());
            let counts = parse_reports(&conn, &reports, settings.parse_chunk_size)?;
            counts.print();
            Ok(())
        }
        Commands::Consolidate => {
            let conn = db::connect(&settings.db_path())?;
            db::init_schema(&conn)?;
            consolidate(&conn, &settings)
        }
        Commands::Run { limit } => {
            let conn = db::connect(&settings.db_path())?;
            db::init_schema(&conn)?;
            let reports = db::fetch_unvisited(&conn, limit)?;

            // Phase 1: Download (streaming to DB)
            if reports.is_empty() {
                println!("No unvisited reports to download.");
            } else {
                let t_download = Instant::now();
                println!("Pipeline: downloading {} reports...", reports.len());
                let client = downloader::build_client(&settings)?;
                let stats =
                    downloader::download_reports_streaming(&conn, client, &settings, reports)
                        .await?;
                print_download_stats(&stats);
                println!("Downloaded in {:.1}s", t_download.elapsed().as_secs_f64());
            }

            // Phase 2: Parse
            let unparsed = db::fetch_unparsed(&conn, None)?;
            if unparsed.is_empty() {
                println!("Nothing to parse.");
            } else {
                let t_parse = Instant::now();
                println!("Parsing {} reports...", unparsed.len());
                let counts = parse_reports(&conn, &unparsed, settings.parse_chunk_size)?;
                println!("Parsed in {:.1}s", t_parse.elapsed().as_secs_f64());
                counts.print();
            }

            // Phase 3: Consolidate
            consolidate(&conn, &settings)
        }
        Commands::Extract { pdf, output } => {
            let records = parser::parse_pdf(&pdf)
                .with_context(|| format!("failed to parse {}", pdf.display()))?;
            match output {
                Some(path) => {
                    export::write_report_csv(&path, &records)?;
                    println!("Wrote {} records to {}", records.len(), path.display());
                }
                None => export::write_records(std::io::stdout().lock(), &records)?,
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path())?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Reports:      {}", s.total);
            println!("Visited:      {}", s.visited);
            println!("Unvisited:    {}", s.unvisited);
            println!("Downloaded:   {}", s.downloaded);
            println!("Missing:      {}", s.missing);
            println!("Errors:       {}", s.errors);
            println!("Parsed:       {}", s.parsed);
            println!("Parse errors: {}", s.parse_errors);
            println!("Records:      {}", s.records);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_download_stats(stats: &downloader::DownloadStats) {
    println!(
        "Done: {} visited ({} downloaded, {} cached, {} missing, {} errors).",
        stats.total, stats.downloaded, stats.cached, stats.missing, stats.errors
    );
}

struct ParseCounts {
    reports: usize,
    failed: usize,
    records: usize,
}

impl ParseCounts {
    fn print(&self) {
        println!(
            "Parsed {} reports ({} failed), {} grade records.",
            self.reports, self.failed, self.records
        );
    }
}

fn parse_reports(
    conn: &rusqlite::Connection,
    reports: &[db::PendingParse],
    chunk_size: usize,
) -> anyhow::Result<ParseCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(reports.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ParseCounts {
        reports: 0,
        failed: 0,
        records: 0,
    };

    for chunk in reports.chunks(chunk_size.max(1)) {
        let results: Vec<_> = chunk.par_iter().map(parser::process_report).collect();

        for (report, row) in chunk.iter().zip(&results) {
            counts.reports += 1;
            match (&row.error, row.record_count) {
                (Some(e), _) => {
                    warn!("Failed to parse {}: {}", report.filename, e);
                    counts.failed += 1;
                }
                (None, Some(n)) => counts.records += n,
                (None, None) => {}
            }
        }

        db::save_parsed(conn, &results)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn consolidate(conn: &rusqlite::Connection, settings: &Settings) -> anyhow::Result<()> {
    let csvs = db::fetch_report_csvs(conn)?;
    if csvs.is_empty() {
        println!("No parsed reports. Run 'parse' first.");
        return Ok(());
    }
    let summaries = export::consolidate_terms(&csvs, &settings.term_dir())?;
    for s in &summaries {
        println!(
            "{}: {} reports, {} rows -> {}",
            s.term,
            s.reports,
            s.rows,
            s.path.display()
        );
    }
    println!("Wrote {} term files.", summaries.len());
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
