//! 公共工具函数模块
//!
//! 加载配置并打开存储，供各命令模块共享。

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use apirun_storage::{Storage, StorageManager};

use crate::config::CliConfig;

/// 打开配置中的数据库
pub async fn open_storage(config: &CliConfig) -> Result<Arc<Storage>> {
    debug!("打开数据库: {}", config.database_path);
    let manager = StorageManager::new(&config.database_path)
        .await
        .with_context(|| format!("打开数据库失败: {}", config.database_path))?;
    Ok(Arc::new(Storage::from_manager(&manager)))
}

/// 加载配置并打开数据库
pub async fn load_context() -> Result<(CliConfig, Arc<Storage>)> {
    let config = CliConfig::load()?;
    let storage = open_storage(&config).await?;
    Ok((config, storage))
}
