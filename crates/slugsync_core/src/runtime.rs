use std::env;
use std::path::{Path, PathBuf};

pub const INIT_POLICY_MESSAGE: &str =
    "Run `slugsync init` to create the store and apply pending schema migrations.";

pub const DB_ENV_VAR: &str = "SLUGSYNC_DB";
pub const CONFIG_ENV_VAR: &str = "SLUGSYNC_CONFIG";
pub const DEFAULT_DB_FILENAME: &str = "slugsync.db";
pub const DEFAULT_CONFIG_FILENAME: &str = "slugsync.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub db_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "db_path={} ({})\nconfig_path={} ({})\npolicy={}",
            normalize_for_display(&self.db_path),
            self.db_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            INIT_POLICY_MESSAGE
        )
    }
}

pub fn resolve_paths(overrides: &PathOverrides) -> ResolvedPaths {
    resolve_paths_with_lookup(overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(overrides: &PathOverrides, lookup_env: F) -> ResolvedPaths
where
    F: Fn(&str) -> Option<String>,
{
    let (db_path, db_source) = resolve_path(
        overrides.db.as_deref(),
        DB_ENV_VAR,
        DEFAULT_DB_FILENAME,
        &lookup_env,
    );
    let (config_path, config_source) = resolve_path(
        overrides.config.as_deref(),
        CONFIG_ENV_VAR,
        DEFAULT_CONFIG_FILENAME,
        &lookup_env,
    );
    ResolvedPaths {
        db_path,
        config_path,
        db_source,
        config_source,
    }
}

fn resolve_path<F>(
    flag: Option<&Path>,
    env_var: &str,
    default: &str,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = flag {
        return (path.to_path_buf(), ValueSource::Flag);
    }
    if let Some(value) = lookup_env(env_var) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return (PathBuf::from(trimmed), ValueSource::Env);
        }
    }
    (PathBuf::from(default), ValueSource::Default)
}

fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
