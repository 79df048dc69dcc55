pub mod error;

pub use error::*;

use hostdeck_cloud::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "HOSTDECK_CONFIG_PATH";
pub const TRACK_INTERVAL_ENV: &str = "HOSTDECK_TRACK_INTERVAL_MS";
pub const TRACK_TIMEOUT_ENV: &str = "HOSTDECK_TRACK_TIMEOUT_TICKS";

/// hostdeckの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("hostdeck");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 HOSTDECK_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: hostdeck.local.yaml, hostdeck.yaml
/// 3. ~/.config/hostdeck/hostdeck.yaml (グローバル設定)
///
/// 見つからない場合は `None` (デフォルト設定を使う)
pub fn find_settings_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    let current_dir = std::env::current_dir()?;
    for filename in ["hostdeck.local.yaml", "hostdeck.yaml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("hostdeck").join("hostdeck.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// 状態追跡 (convergence tracker) の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// ポーリング間隔 (ミリ秒)
    pub interval_ms: u64,
    /// 打ち切りまでのポーリング回数
    pub timeout_ticks: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            timeout_ticks: 120,
        }
    }
}

/// hostdeck.yaml の内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tracker: TrackerSettings,

    /// アカウント保存先 (省略時は設定ディレクトリの accounts.json)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts_file: Option<PathBuf>,
}

impl Settings {
    /// 設定ファイルを探して読み込み、環境変数で上書きする
    pub fn load() -> Result<Self> {
        let mut settings = match find_settings_file()? {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        settings.apply_env()?;
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        tracing::debug!("Loading settings from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(ms) = env_number::<u64>(TRACK_INTERVAL_ENV)? {
            self.tracker.interval_ms = ms;
        }
        if let Some(ticks) = env_number::<u32>(TRACK_TIMEOUT_ENV)? {
            self.tracker.timeout_ticks = ticks;
        }
        Ok(())
    }

    /// アカウント保存先のパス
    pub fn accounts_path(&self) -> Result<PathBuf> {
        match &self.accounts_file {
            Some(path) => Ok(path.clone()),
            None => Ok(get_config_dir()?.join("accounts.json")),
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            interval: Duration::from_millis(self.tracker.interval_ms),
            timeout_ticks: self.tracker.timeout_ticks,
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
