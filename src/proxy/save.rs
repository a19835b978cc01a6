//! Local persistence of check results

use crate::proxy::models::{CheckResult, ProxyDefinition};
use crate::Result;
use anyhow::{bail, Context};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File holding the passing definitions
pub const PROXIES_FILE: &str = "all.json";

/// Same definitions as a Clash-style `proxies:` document
pub const PROXIES_YAML_FILE: &str = "all.yaml";

/// File holding the full check results
pub const RESULTS_FILE: &str = "results.json";

#[derive(Serialize)]
struct ProxiesDocument<'a> {
    proxies: Vec<&'a ProxyDefinition>,
}

/// Writes result files into one output directory
#[derive(Debug, Clone)]
pub struct LocalSaver {
    output_dir: PathBuf,
}

impl LocalSaver {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Write the definitions and the full results of a run.
    ///
    /// An empty run still writes every file, replacing the previous run's.
    pub fn save_results(&self, results: &[CheckResult]) -> Result<()> {
        let proxies: Vec<&ProxyDefinition> = results.iter().map(|r| &r.proxy).collect();
        self.save_json(PROXIES_FILE, &proxies)?;
        self.save_yaml(PROXIES_YAML_FILE, &ProxiesDocument { proxies })?;
        self.save_json(RESULTS_FILE, &results)?;
        Ok(())
    }

    /// Serialize `value` as pretty JSON into `filename`
    pub fn save_json<T: Serialize + ?Sized>(&self, filename: &str, value: &T) -> Result<PathBuf> {
        let data = serde_json::to_vec_pretty(value)?;
        self.save(&data, filename)
    }

    /// Serialize `value` as YAML into `filename`
    pub fn save_yaml<T: Serialize + ?Sized>(&self, filename: &str, value: &T) -> Result<PathBuf> {
        let data = serde_yaml::to_string(value)?;
        self.save(data.as_bytes(), filename)
    }

    /// Write raw bytes into `filename` inside the output directory
    pub fn save(&self, data: &[u8], filename: &str) -> Result<PathBuf> {
        validate_input(data, filename)?;

        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("failed to create output directory {}", self.output_dir.display())
        })?;

        let path = self.output_dir.join(filename);
        fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Saved {}", path.display());

        Ok(path)
    }
}

fn validate_input(data: &[u8], filename: &str) -> Result<()> {
    if data.is_empty() {
        bail!("refusing to write empty data");
    }
    if filename.is_empty() {
        bail!("filename must not be empty");
    }
    if Path::new(filename).file_name().and_then(|n| n.to_str()) != Some(filename) {
        bail!("filename must be a bare file name: {}", filename);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProxyType;
    use crate::proxy::parser::ProxyParser;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("subs-check-save-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_validate_input() {
        assert!(validate_input(b"{}", "all.json").is_ok());
        assert!(validate_input(b"", "all.json").is_err());
        assert!(validate_input(b"{}", "").is_err());
        assert!(validate_input(b"{}", "../all.json").is_err());
        assert!(validate_input(b"{}", "nested/all.json").is_err());
    }

    #[test]
    fn test_save_results_creates_directory() {
        let dir = temp_dir("results");
        let saver = LocalSaver::new(&dir);

        let mut result = CheckResult::new(
            ProxyDefinition::new()
                .with("name", "🇺🇸US_1")
                .with("server", "1.2.3.4")
                .with("port", 443),
        );
        result.google = true;
        saver.save_results(&[result]).unwrap();

        let proxies: Vec<ProxyDefinition> =
            serde_json::from_slice(&fs::read(dir.join(PROXIES_FILE)).unwrap()).unwrap();
        assert_eq!(proxies.len(), 1);
        assert_eq!(proxies[0].name(), Some("🇺🇸US_1"));

        let results: Vec<CheckResult> =
            serde_json::from_slice(&fs::read(dir.join(RESULTS_FILE)).unwrap()).unwrap();
        assert!(results[0].google);

        let yaml = fs::read_to_string(dir.join(PROXIES_YAML_FILE)).unwrap();
        assert!(yaml.starts_with("proxies:"));
        let proxies = ProxyParser::parse_subscription(&yaml, ProxyType::Http).unwrap();
        assert_eq!(proxies.len(), 1);
        assert_eq!(proxies[0].dedup_key().as_deref(), Some("1.2.3.4:443"));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_save_empty_results() {
        let dir = temp_dir("empty");
        let saver = LocalSaver::new(&dir);
        saver.save_results(&[]).unwrap();

        let proxies: Vec<ProxyDefinition> =
            serde_json::from_slice(&fs::read(dir.join(PROXIES_FILE)).unwrap()).unwrap();
        assert!(proxies.is_empty());

        let yaml = fs::read_to_string(dir.join(PROXIES_YAML_FILE)).unwrap();
        assert!(ProxyParser::parse_subscription(&yaml, ProxyType::Http)
            .unwrap()
            .is_empty());

        fs::remove_dir_all(dir).ok();
    }
}
