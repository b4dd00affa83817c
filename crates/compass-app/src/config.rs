//! 应用配置

use anyhow::{Context, Result};
use compass_core::CoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

/// 应用配置（JSON 文件，所有字段可省略）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 日志级别：trace / debug / info / warn / error
    pub log_level: String,
    pub core: CoreConfig,
    /// 输出目录
    pub output: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            core: CoreConfig::default(),
            output: std::env::temp_dir(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn level(&self) -> Result<Level> {
        self.log_level
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown log level: {}", self.log_level))
    }
}
