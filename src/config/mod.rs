use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Classification table as written in YAML.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassificationConfig {
    /// Thematic filter every emitted entity must satisfy.
    #[serde(default)]
    pub filter: Option<String>,
    /// When false, only entities carrying a `name` tag are emitted.
    #[serde(default = "default_true")]
    pub keep_unnamed: bool,
    /// Extra tag keys that make an entity relevant.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Ordered categories; the first match wins.
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            filter: None,
            keep_unnamed: true,
            keys: Vec::new(),
            categories: Vec::new(),
        }
    }
}

impl ClassificationConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_yaml_str(source: &str) -> anyhow::Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(
                source,
                ::config::FileFormat::Yaml,
            ))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CategoryConfig {
    pub name: String,
    /// Filter expression (DSL string)
    #[serde(rename = "match")]
    pub match_expr: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuntimeConfig {
    pub index_mode: IndexMode,
    /// Bytes of memory the run may assume; probed from the OS when unset.
    pub memory_budget: Option<u64>,
    /// Share of the memory budget below which the input is indexed in memory.
    pub memory_fraction: f64,
    pub tmp_dir: Option<PathBuf>,
    /// Upper bound on repeated group scans looking for nested group references.
    pub group_rescans: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            index_mode: IndexMode::Auto,
            memory_budget: None,
            memory_fraction: 0.05,
            tmp_dir: None,
            group_rescans: 1,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    Auto,
    Memory,
    Disk,
}

impl FromStr for IndexMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Ok(IndexMode::Auto),
            "memory" => Ok(IndexMode::Memory),
            "disk" => Ok(IndexMode::Disk),
            _ => Err(format!("invalid index mode: {value}")),
        }
    }
}
