use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_path: Option<String>,

    pub coverage: Option<CoverageConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CoverageConfig {
    /// Years one export covers, counting back from its download date.
    pub years: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
db_path = "/data/timeline.db"

[coverage]
years = 2
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();

        assert_eq!(config.db_path.as_deref(), Some("/data/timeline.db"));
        assert_eq!(config.coverage.unwrap().years, Some(2));
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let config = FileConfig::load(file.path()).unwrap();

        assert!(config.db_path.is_none());
        assert!(config.coverage.is_none());
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db_path = [").unwrap();

        let err = FileConfig::load(file.path()).unwrap_err();

        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
