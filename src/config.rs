use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::eligibility::evaluator::MatchPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchingConfig {
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportConfig {
    #[serde(default = "default_terminal_case_limit")]
    pub terminal_case_limit: usize,
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub case_sensitive: Option<bool>,
    pub terminal_case_limit: Option<usize>,
    pub histogram_bins: Option<usize>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/cohort-screen/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(case_sensitive) = overrides.case_sensitive {
            self.matching.case_sensitive = case_sensitive;
        }
        if let Some(limit) = overrides.terminal_case_limit {
            self.report.terminal_case_limit = limit;
        }
        if let Some(bins) = overrides.histogram_bins {
            self.report.histogram_bins = bins.max(1);
        }
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            case_sensitive: self.matching.case_sensitive,
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn default_template() -> String {
        let template = r#"[matching]
case_sensitive = true

[report]
terminal_case_limit = 5
histogram_bins = 10

[server]
host = "127.0.0.1"
port = 3001
"#;
        template.to_string()
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            case_sensitive: default_true(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            terminal_case_limit: default_terminal_case_limit(),
            histogram_bins: default_histogram_bins(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_terminal_case_limit() -> usize {
    5
}

fn default_histogram_bins() -> usize {
    10
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}
