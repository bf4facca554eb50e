//! CLI 配置管理
//!
//! 配置文件: ~/.config/apirun/config.toml，不存在时使用默认值。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use apirun_dispatcher::DispatchConfig;
use apirun_pool::SelectorConfig;
use apirun_transport::TransportConfig;

/// CLI 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// 数据库文件路径
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// 平台地址，执行节点回调使用 (资源池配置了回调地址时以资源池为准)
    #[serde(default)]
    pub ms_url: Option<String>,

    /// 默认项目 ID
    #[serde(default)]
    pub default_project: Option<String>,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub selector: SelectorConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// 配置版本
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_database_path() -> String {
    "~/.config/apirun/data.db".to_string()
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            ms_url: None,
            default_project: None,
            transport: TransportConfig::default(),
            selector: SelectorConfig::default(),
            dispatch: DispatchConfig::default(),
            version: default_version(),
        }
    }
}

impl CliConfig {
    /// 获取配置文件路径
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("无法获取用户主目录")?;
        Ok(home.join(".config").join("apirun").join("config.toml"))
    }

    /// 加载配置
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            fs::read_to_string(&path).with_context(|| format!("读取配置文件失败: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("解析配置文件失败: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apirun_pool::SelectionStrategy;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config.database_path, "~/.config/apirun/data.db");
        assert_eq!(config.transport.request_timeout, 15);
        assert_eq!(config.selector.strategy, SelectionStrategy::RoundRobin);
        assert_eq!(config.dispatch.default_per_task_concurrency, 3);
    }

    #[test]
    fn test_parse_sections() {
        let config = CliConfig::parse(
            r#"
            database_path = "/tmp/apirun.db"
            ms_url = "http://platform:8081"
            default_project = "proj"

            [transport]
            request_timeout = 30
            verify_ssl = false

            [selector]
            strategy = "first_node"
            "#,
        )
        .unwrap();

        assert_eq!(config.ms_url.as_deref(), Some("http://platform:8081"));
        assert_eq!(config.transport.request_timeout, 30);
        assert_eq!(config.transport.connect_timeout, 5);
        assert!(!config.transport.verify_ssl);
        assert_eq!(config.selector.strategy, SelectionStrategy::FirstNode);
    }
}
