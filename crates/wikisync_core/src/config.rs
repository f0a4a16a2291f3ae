use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use toml::Value;

use crate::naming::DEFAULT_SEPARATOR;
use crate::remote::{DEFAULT_TIMEOUT_MS, DEFAULT_UPLOAD_TIMEOUT_MS};

pub const DEFAULT_USER_AGENT: &str = "wikisync/0.1";
pub const DEFAULT_WIKI_DIR: &str = "Wiki";
pub const DEFAULT_EXPAND_LEVEL: usize = 2;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(default)]
    pub remote: RemoteSection,
    #[serde(default)]
    pub local: LocalSection,
    #[serde(default)]
    pub flat: FlatSection,
    #[serde(skip)]
    pub overrides: RemoteOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RemoteSection {
    pub space_url: Option<String>,
    pub project_key: Option<String>,
    pub api_key: Option<String>,
    pub wiki_prefix: Option<String>,
    pub target_url: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub upload_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct LocalSection {
    pub wiki_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct FlatSection {
    pub input_dir: Option<String>,
    pub output_dir: Option<String>,
    pub separator: Option<String>,
    pub expand_level: Option<usize>,
}

/// Values given on the command line. They win over env and file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOverrides {
    pub space_url: Option<String>,
    pub project_key: Option<String>,
    pub api_key: Option<String>,
    pub wiki_prefix: Option<String>,
    pub target_url: Option<String>,
}

impl SyncConfig {
    pub fn apply_overrides(&mut self, overrides: RemoteOverrides) {
        self.overrides = overrides;
    }

    /// flag > env WIKISYNC_SPACE_URL > config.
    pub fn space_url(&self) -> Option<String> {
        resolve_text(
            self.overrides.space_url.as_deref(),
            "WIKISYNC_SPACE_URL",
            self.remote.space_url.as_deref(),
        )
    }

    pub fn project_key(&self) -> Option<String> {
        resolve_text(
            self.overrides.project_key.as_deref(),
            "WIKISYNC_PROJECT_KEY",
            self.remote.project_key.as_deref(),
        )
    }

    pub fn api_key(&self) -> Option<String> {
        resolve_text(
            self.overrides.api_key.as_deref(),
            "WIKISYNC_API_KEY",
            self.remote.api_key.as_deref(),
        )
    }

    pub fn wiki_prefix(&self) -> Option<String> {
        resolve_text(
            self.overrides.wiki_prefix.as_deref(),
            "WIKISYNC_WIKI_PREFIX",
            self.remote.wiki_prefix.as_deref(),
        )
    }

    pub fn target_url(&self) -> Option<String> {
        resolve_text(
            self.overrides.target_url.as_deref(),
            "WIKISYNC_TARGET_URL",
            self.remote.target_url.as_deref(),
        )
    }

    /// env WIKISYNC_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        resolve_text(None, "WIKISYNC_USER_AGENT", self.remote.user_agent.as_deref())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        env_value_u64("WIKISYNC_HTTP_TIMEOUT_MS")
            .or(self.remote.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn upload_timeout_ms(&self) -> u64 {
        env_value_u64("WIKISYNC_UPLOAD_TIMEOUT_MS")
            .or(self.remote.upload_timeout_ms)
            .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_MS)
    }

    pub fn wiki_dir(&self) -> &str {
        self.local.wiki_dir.as_deref().unwrap_or(DEFAULT_WIKI_DIR)
    }

    pub fn separator(&self) -> &str {
        self.flat.separator.as_deref().unwrap_or(DEFAULT_SEPARATOR)
    }

    pub fn expand_level(&self) -> usize {
        self.flat.expand_level.unwrap_or(DEFAULT_EXPAND_LEVEL)
    }
}

fn resolve_text(flag: Option<&str>, env_key: &str, file: Option<&str>) -> Option<String> {
    if let Some(value) = non_empty(flag) {
        return Some(value);
    }
    if let Ok(value) = env::var(env_key)
        && let Some(value) = non_empty(Some(&value))
    {
        return Some(value);
    }
    non_empty(file)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn env_value_u64(key: &str) -> Option<u64> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Load and parse a SyncConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SyncConfig> {
    if !config_path.exists() {
        return Ok(SyncConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SyncConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[derive(Debug, Clone, Default)]
pub struct FlatConfigPatch {
    pub set_input_dir: Option<String>,
    pub set_output_dir: Option<String>,
    pub set_separator: Option<String>,
    pub set_expand_level: Option<usize>,
}

/// Update selected keys under `[flat]` while preserving all other config sections.
/// Returns `true` when a write occurred.
pub fn patch_flat_config(config_path: &Path, patch: &FlatConfigPatch) -> Result<bool> {
    if patch.set_input_dir.is_none()
        && patch.set_output_dir.is_none()
        && patch.set_separator.is_none()
        && patch.set_expand_level.is_none()
    {
        return Ok(false);
    }

    let mut root = if config_path.exists() {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        toml::from_str::<Value>(&content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?
    } else {
        Value::Table(Default::default())
    };
    let original = root.clone();

    let root_table = root.as_table_mut().ok_or_else(|| {
        anyhow::anyhow!(
            "top-level TOML must be a table in {}",
            config_path.display()
        )
    })?;
    let flat_entry = root_table
        .entry("flat".to_string())
        .or_insert_with(|| Value::Table(Default::default()));
    let flat_table = flat_entry
        .as_table_mut()
        .ok_or_else(|| anyhow::anyhow!("[flat] must be a table in {}", config_path.display()))?;

    if let Some(input_dir) = &patch.set_input_dir {
        flat_table.insert("input_dir".to_string(), Value::String(input_dir.clone()));
    }
    if let Some(output_dir) = &patch.set_output_dir {
        flat_table.insert("output_dir".to_string(), Value::String(output_dir.clone()));
    }
    if let Some(separator) = &patch.set_separator {
        if separator.is_empty() || separator.contains('/') {
            bail!("flat separator must be non-empty and must not contain '/'");
        }
        flat_table.insert("separator".to_string(), Value::String(separator.clone()));
    }
    if let Some(expand_level) = patch.set_expand_level {
        let level = i64::try_from(expand_level).context("expand level is out of range")?;
        flat_table.insert("expand_level".to_string(), Value::Integer(level));
    }

    if root == original {
        return Ok(false);
    }

    let parent = config_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", config_path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    let rendered = toml::to_string_pretty(&root).context("failed to serialize config TOML")?;
    fs::write(config_path, rendered)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(true)
}
