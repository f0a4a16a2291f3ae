use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::SyncConfig;

pub const CONFIG_FILENAME: &str = ".wikisync.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub wiki_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    /// The local mirror folder: flag > `[local].wiki_dir` > `Wiki`, relative
    /// to the project root.
    pub fn wiki_dir(&self, overrides: &PathOverrides, config: &SyncConfig) -> (PathBuf, ValueSource) {
        if let Some(path) = overrides.wiki_dir.as_deref() {
            return (absolutize(path, &self.project_root), ValueSource::Flag);
        }
        let source = if config.local.wiki_dir.is_some() {
            ValueSource::Config
        } else {
            ValueSource::Default
        };
        (
            absolutize(Path::new(config.wiki_dir()), &self.project_root),
            source,
        )
    }

    pub fn diagnostics(&self, wiki_dir: &(PathBuf, ValueSource)) -> String {
        format!(
            "project_root={} ({})\nconfig_path={} ({})\nconfig_exists={}\nwiki_dir={} ({})\nwiki_dir_exists={}",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            self.config_path.exists(),
            normalize_for_display(&wiki_dir.0),
            wiki_dir.1.as_str(),
            wiki_dir.0.is_dir(),
        )
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env);

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = non_blank(lookup_env("WIKISYNC_CONFIG")) {
        (
            absolutize(Path::new(value.trim()), &project_root),
            ValueSource::Env,
        )
    } else {
        (project_root.join(CONFIG_FILENAME), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        project_root,
        config_path,
        root_source,
        config_source,
    })
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }
    if let Some(value) = non_blank(lookup_env("WIKISYNC_PROJECT_ROOT")) {
        return (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        );
    }
    for candidate in context.cwd.ancestors() {
        if candidate.join(CONFIG_FILENAME).is_file() {
            return (candidate.to_path_buf(), ValueSource::Heuristic);
        }
    }
    (context.cwd.clone(), ValueSource::Default)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Write a commented starter config. Returns `false` when the file already
/// exists and `force` is not set.
pub fn init_config(paths: &ResolvedPaths, force: bool) -> Result<bool> {
    write_text_file(&paths.config_path, &render_default_config(), force)
}

pub fn render_default_config() -> String {
    format!(
        "# wikisync configuration\n# Environment variables (WIKISYNC_*) and command-line flags override these values.\n\n[remote]\n# space_url = \"https://your-space.backlog.com\"\n# project_key = \"PROJ\"\n# api_key = \"\"  # prefer WIKISYNC_API_KEY\n# wiki_prefix = \"\"\n# target_url = \"\"\n# user_agent = \"{agent}\"\n# timeout_ms = {timeout}\n# upload_timeout_ms = {upload_timeout}\n\n[local]\nwiki_dir = \"{wiki_dir}\"\n\n[flat]\n# input_dir = \"{wiki_dir}\"\n# output_dir = \"../project.wiki\"\nseparator = \"{separator}\"\nexpand_level = {expand}\n",
        agent = crate::config::DEFAULT_USER_AGENT,
        timeout = crate::remote::DEFAULT_TIMEOUT_MS,
        upload_timeout = crate::remote::DEFAULT_UPLOAD_TIMEOUT_MS,
        wiki_dir = crate::config::DEFAULT_WIKI_DIR,
        separator = crate::naming::DEFAULT_SEPARATOR,
        expand = crate::config::DEFAULT_EXPAND_LEVEL,
    )
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use super::{
        CONFIG_FILENAME, PathOverrides, ResolutionContext, ValueSource, init_config,
        resolve_paths_with_lookup,
    };
    use crate::config::{SyncConfig, load_config};

    #[test]
    fn resolve_paths_prefers_flag_over_env() {
        let temp = tempdir().expect("tempdir");
        let cwd = temp.path().join("cwd");
        let from_flag = temp.path().join("flag-root");
        fs::create_dir_all(&cwd).expect("create cwd");

        let overrides = PathOverrides {
            project_root: Some(from_flag.clone()),
            ..PathOverrides::default()
        };
        let context = ResolutionContext { cwd: cwd.clone() };

        let env = HashMap::from([(
            "WIKISYNC_PROJECT_ROOT".to_string(),
            temp.path().join("env-root").to_string_lossy().to_string(),
        )]);

        let resolved = resolve_paths_with_lookup(&context, &overrides, |key| env.get(key).cloned())
            .expect("resolve paths");
        assert_eq!(resolved.project_root, from_flag);
        assert_eq!(resolved.root_source, ValueSource::Flag);
        assert_eq!(resolved.config_path, from_flag.join(CONFIG_FILENAME));
        assert_eq!(resolved.config_source, ValueSource::Default);
    }

    #[test]
    fn resolve_paths_finds_nearest_config_ancestor() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("project");
        let nested = root.join("Wiki").join("Dev");
        fs::create_dir_all(&nested).expect("create nested");
        fs::write(root.join(CONFIG_FILENAME), "").expect("write config");

        let context = ResolutionContext { cwd: nested };
        let resolved = resolve_paths_with_lookup(&context, &PathOverrides::default(), |_| None)
            .expect("resolve");
        assert_eq!(resolved.project_root, root);
        assert_eq!(resolved.root_source, ValueSource::Heuristic);
    }

    #[test]
    fn resolve_paths_falls_back_to_cwd_and_env_config() {
        let temp = tempdir().expect("tempdir");
        let cwd = temp.path().join("plain");
        fs::create_dir_all(&cwd).expect("create cwd");
        let env = HashMap::from([("WIKISYNC_CONFIG".to_string(), "alt.toml".to_string())]);

        let context = ResolutionContext { cwd: cwd.clone() };
        let resolved =
            resolve_paths_with_lookup(&context, &PathOverrides::default(), |key| {
                env.get(key).cloned()
            })
            .expect("resolve");
        assert_eq!(resolved.project_root, cwd);
        assert_eq!(resolved.root_source, ValueSource::Default);
        assert_eq!(resolved.config_path, cwd.join("alt.toml"));
        assert_eq!(resolved.config_source, ValueSource::Env);
    }

    #[test]
    fn wiki_dir_resolution_and_diagnostics() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().to_path_buf();
        let context = ResolutionContext { cwd: root.clone() };
        let paths = resolve_paths_with_lookup(&context, &PathOverrides::default(), |_| None)
            .expect("resolve");

        let mut config = SyncConfig::default();
        let resolved = paths.wiki_dir(&PathOverrides::default(), &config);
        assert_eq!(resolved, (root.join("Wiki"), ValueSource::Default));

        config.local.wiki_dir = Some("Mirror".to_string());
        let resolved = paths.wiki_dir(&PathOverrides::default(), &config);
        assert_eq!(resolved, (root.join("Mirror"), ValueSource::Config));

        let report = paths.diagnostics(&resolved);
        assert!(report.contains("wiki_dir="));
        assert!(report.contains("(config)"));
        assert!(report.contains("wiki_dir_exists=false"));
    }

    #[test]
    fn init_config_writes_parseable_starter_once() {
        let temp = tempdir().expect("tempdir");
        let context = ResolutionContext {
            cwd: temp.path().to_path_buf(),
        };
        let paths = resolve_paths_with_lookup(&context, &PathOverrides::default(), |_| None)
            .expect("resolve");

        assert!(init_config(&paths, false).expect("init"));
        assert!(!init_config(&paths, false).expect("second init"));

        let config = load_config(&paths.config_path).expect("load starter");
        assert_eq!(config.wiki_dir(), "Wiki");
        assert_eq!(config.separator(), " › ");
        assert_eq!(config.expand_level(), 2);
    }
}
