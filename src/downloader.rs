use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::{self, DownloadRow, Outcome, PendingReport};
use crate::settings::Settings;

/// Download stats returned after completion.
pub struct DownloadStats {
    pub total: usize,
    pub downloaded: usize,
    pub cached: usize,
    pub missing: usize,
    pub errors: usize,
}

pub fn build_client(settings: &Settings) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(settings.accept_invalid_certs)
        .timeout(Duration::from_secs(60))
        .build()?;
    Ok(client)
}

/// Download reports concurrently, saving each outcome to the ledger as it arrives.
pub async fn download_reports_streaming(
    conn: &Connection,
    client: reqwest::Client,
    settings: &Settings,
    reports: Vec<PendingReport>,
) -> Result<DownloadStats> {
    let pdf_dir = settings.pdf_dir();
    tokio::fs::create_dir_all(&pdf_dir).await?;

    let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let policy = RetryPolicy {
        max_retries: settings.max_retries,
        base_backoff: Duration::from_millis(settings.backoff_ms),
    };
    let total = reports.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Workers send results, this task owns the connection.
    let (tx, mut rx) = tokio::sync::mpsc::channel::<DownloadRow>(settings.concurrency.max(1) * 2);

    for report in reports {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let path = pdf_dir.join(&report.filename);

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let row = fetch_report(&client, &report, &path, policy).await;
            let _ = tx.send(row).await;
        });
    }

    drop(tx);

    let mut stats = DownloadStats {
        total,
        downloaded: 0,
        cached: 0,
        missing: 0,
        errors: 0,
    };

    while let Some(row) = rx.recv().await {
        match row.outcome {
            Outcome::Downloaded => stats.downloaded += 1,
            Outcome::Cached => stats.cached += 1,
            Outcome::Missing => stats.missing += 1,
            Outcome::Error => {
                warn!(
                    "Download failed for {}: {}",
                    row.filename,
                    row.error.as_deref().unwrap_or("unknown error")
                );
                stats.errors += 1;
            }
        }
        db::save_download(conn, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Visited {} reports ({} downloaded, {} cached, {} missing, {} errors)",
        stats.total, stats.downloaded, stats.cached, stats.missing, stats.errors
    );

    Ok(stats)
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: u32,
    base_backoff: Duration,
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Serve from the on-disk cache when the file exists, otherwise download with retry.
async fn fetch_report(
    client: &reqwest::Client,
    report: &PendingReport,
    path: &Path,
    policy: RetryPolicy,
) -> DownloadRow {
    let mut row = DownloadRow {
        report_id: report.report_id,
        filename: report.filename.clone(),
        path: None,
        outcome: Outcome::Error,
        http_status: None,
        error: None,
        latency_ms: None,
    };

    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        row.outcome = Outcome::Cached;
        row.path = Some(path.to_path_buf());
        return row;
    }

    let start = Instant::now();
    let result = download_with_retry(client, &report.url, path, policy).await;
    row.latency_ms = Some(start.elapsed().as_millis() as i64);

    match result {
        Ok((status, saved)) => {
            row.http_status = Some(status.as_u16());
            if let Some(saved) = saved {
                row.outcome = Outcome::Downloaded;
                row.path = Some(saved);
            } else if status == StatusCode::NOT_FOUND {
                row.outcome = Outcome::Missing;
            } else {
                row.error = Some(format!("HTTP {}", status));
            }
        }
        Err(e) => row.error = Some(format!("{:#}", e)),
    }
    row
}

/// Returns the final status and, on success, where the PDF was written.
async fn download_with_retry(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    policy: RetryPolicy,
) -> Result<(StatusCode, Option<PathBuf>)> {
    let mut attempt = 0;
    loop {
        match try_download(client, url, path).await {
            Ok((status, _)) if should_retry(status) && attempt < policy.max_retries => {
                warn!("HTTP {} for {} (attempt {}/{})", status, url, attempt + 1, policy.max_retries);
            }
            Err(e) if attempt < policy.max_retries => {
                warn!("Request failed for {} (attempt {}/{}): {}", url, attempt + 1, policy.max_retries, e);
            }
            other => return other,
        }
        tokio::time::sleep(policy.backoff(attempt)).await;
        attempt += 1;
    }
}

async fn try_download(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<(StatusCode, Option<PathBuf>)> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Ok((status, None));
    }
    let bytes = response.bytes().await?;

    // A cached path must only ever hold a complete file.
    let part = path.with_extension("part");
    if let Err(e) = tokio::fs::write(&part, &bytes).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e.into());
    }
    tokio::fs::rename(&part, path).await?;
    Ok((status, Some(path.to_path_buf())))
}
