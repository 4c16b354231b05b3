use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

const DEFAULT_ROOT_URL: &str = "https://web-as.tamu.edu/gradereport/";
const DEFAULT_PDF_BASE_URL: &str = "https://web-as.tamu.edu/gradereport/PDFReports";

/// Runtime settings: built-in defaults overridden by `GRADES_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub root_url: String,
    pub pdf_base_url: String,
    pub data_dir: PathBuf,
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub parse_chunk_size: usize,
    pub accept_invalid_certs: bool,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_env(Environment::with_prefix("GRADES").try_parsing(true))
    }

    fn from_env(env: Environment) -> Result<Self> {
        Config::builder()
            .set_default("root_url", DEFAULT_ROOT_URL)?
            .set_default("pdf_base_url", DEFAULT_PDF_BASE_URL)?
            .set_default("data_dir", "documents")?
            .set_default("concurrency", 10_i64)?
            .set_default("max_retries", 3_i64)?
            .set_default("backoff_ms", 2000_i64)?
            .set_default("parse_chunk_size", 200_i64)?
            .set_default("accept_invalid_certs", false)?
            .add_source(env)
            .build()
            .context("failed to build settings")?
            .try_deserialize()
            .context("invalid settings")
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.data_dir.join("pdfs")
    }

    pub fn term_dir(&self) -> PathBuf {
        self.data_dir.join("terms")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("grades.sqlite")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix("GRADES")
            .try_parsing(true)
            .source(Some(map))
    }

    #[test]
    fn defaults() {
        let s = Settings::from_env(env(&[])).unwrap();
        assert_eq!(s.root_url, DEFAULT_ROOT_URL);
        assert_eq!(s.concurrency, 10);
        assert_eq!(s.max_retries, 3);
        assert!(!s.accept_invalid_certs);
        assert_eq!(s.pdf_dir(), PathBuf::from("documents/pdfs"));
        assert_eq!(s.db_path(), PathBuf::from("documents/grades.sqlite"));
    }

    #[test]
    fn env_overrides() {
        let s = Settings::from_env(env(&[
            ("GRADES_DATA_DIR", "/tmp/grades"),
            ("GRADES_CONCURRENCY", "4"),
            ("GRADES_ACCEPT_INVALID_CERTS", "true"),
        ]))
        .unwrap();
        assert_eq!(s.data_dir, PathBuf::from("/tmp/grades"));
        assert_eq!(s.concurrency, 4);
        assert!(s.accept_invalid_certs);
        assert_eq!(s.term_dir(), PathBuf::from("/tmp/grades/terms"));
    }
}
