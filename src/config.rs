use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::constants;

const CONFIG_FILE: &str = "prefs.toml";

/// User preferences persisted between runs.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  pub server_url: Option<String>,
  pub page_size: Option<u32>,
}

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "vtba")
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = project_dirs() {
      let config_file = proj_dirs.config_dir().join(CONFIG_FILE);
      if let Ok(content) = std::fs::read_to_string(config_file)
        && let Ok(config) = toml::from_str(&content)
      {
        return config;
      }
    }
    Self::default()
  }

  pub fn save(&self) -> anyhow::Result<PathBuf> {
    let proj_dirs = project_dirs().ok_or_else(|| anyhow::anyhow!("no home directory to store preferences in"))?;
    let config_dir = proj_dirs.config_dir();
    std::fs::create_dir_all(config_dir)?;
    let config_file = config_dir.join(CONFIG_FILE);
    std::fs::write(&config_file, toml::to_string(self)?)?;
    Ok(config_file)
  }

  /// Server base URL without a trailing slash.
  pub fn server_url(&self) -> String {
    let url = self.server_url.as_deref().unwrap_or(&constants().default_server_url);
    url.trim_end_matches('/').to_string()
  }

  /// Page size for listings; zero in the file falls back to the default.
  pub fn page_size(&self) -> u32 {
    self.page_size.filter(|n| *n > 0).unwrap_or(constants().default_page_size)
  }
}

/// Directory for the rolling log file, if the platform has one.
pub fn log_dir() -> Option<PathBuf> {
  project_dirs().map(|d| d.data_local_dir().to_path_buf())
}
