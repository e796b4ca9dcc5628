//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::app::manifest::{DEFAULT_ITEM_DELAY, ItemErrorPolicy, PackagingOptions};

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".submitter/config.toml";

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub packaging: Packaging,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    /// Account name substituted for `${user}`.
    #[serde(default)]
    pub username: Option<String>,
    /// Target catalog used when `--targets` is not given.
    #[serde(default)]
    pub targets: Option<PathBuf>,
    #[serde(default)]
    pub show_hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packaging {
    #[serde(default)]
    item_delay_ms: Option<u64>,
    #[serde(default)]
    on_item_error: Option<ItemErrorPolicy>,
}

impl Packaging {
    pub fn item_delay(&self) -> Duration {
        self.item_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_ITEM_DELAY)
    }

    pub fn on_item_error(&self) -> ItemErrorPolicy {
        self.on_item_error.unwrap_or_default()
    }

    pub fn options(&self) -> PackagingOptions {
        PackagingOptions {
            item_delay: self.item_delay(),
            on_item_error: self.on_item_error(),
        }
    }
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    username: Option<String>,
    targets: Option<PathBuf>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            username: env::var("SUBMITTER_USER").ok().filter(|v| !v.is_empty()),
            targets: env::var_os("SUBMITTER_TARGETS")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    #[cfg(test)]
    fn for_tests(username: &str, targets: &str) -> Self {
        Self {
            username: Some(username.to_owned()),
            targets: Some(PathBuf::from(targets)),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace config, and env overrides.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data).with_context(|| format!("in {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            defaults: merge_defaults(self.defaults, other.defaults),
            packaging: merge_packaging(self.packaging, other.packaging),
        }
    }
}

fn merge_defaults(base: Defaults, overlay: Defaults) -> Defaults {
    Defaults {
        username: overlay.username.or(base.username),
        targets: overlay.targets.or(base.targets),
        show_hidden: overlay.show_hidden || base.show_hidden,
    }
}

fn merge_packaging(mut base: Packaging, overlay: Packaging) -> Packaging {
    if let Some(value) = overlay.item_delay_ms {
        base.item_delay_ms = Some(value);
    }
    if let Some(value) = overlay.on_item_error {
        base.on_item_error = Some(value);
    }
    base
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("submitter/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(username) = env.username {
        config.defaults.username = Some(username);
    }
    if let Some(targets) = env.targets {
        config.defaults.targets = Some(targets);
    }
    config
}
