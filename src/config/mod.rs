mod file_config;

pub use file_config::{CoverageConfig, FileConfig};

use crate::history::CoveragePolicy;
use anyhow::{bail, Result};
use std::path::PathBuf;

pub const DEFAULT_COVERAGE_YEARS: u32 = 1;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub coverage_years: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            coverage_years: DEFAULT_COVERAGE_YEARS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub coverage: CoveragePolicy,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        // The database file itself is created on first use, its directory is not
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }
        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }

        let coverage_years = file
            .coverage
            .and_then(|c| c.years)
            .unwrap_or(cli.coverage_years);
        if coverage_years == 0 {
            bail!("coverage years must be at least 1");
        }

        Ok(Self {
            db_path,
            coverage: CoveragePolicy::new(coverage_years),
        })
    }
}
