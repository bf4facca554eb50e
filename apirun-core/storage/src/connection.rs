use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, StorageError};

const SCHEMA: &str = include_str!("../migrations/001_initial.sql");

/// 调度状态所需的表：资源池、授权、任务项标记和场景报告
pub const SCHEMA_TABLES: [&str; 8] = [
    "resource_pools",
    "resource_pool_nodes",
    "project_pool_grants",
    "project_settings",
    "exec_task_items",
    "scenario_reports",
    "scenario_report_steps",
    "execution_set_items",
];

/// 数据库连接和建表
pub struct StorageManager {
    pool: SqlitePool,
    location: String,
}

impl StorageManager {
    /// 打开 (不存在则创建) 文件数据库，`db_path` 支持 `~` 展开
    ///
    /// ```no_run
    /// # use apirun_storage::StorageManager;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let storage = StorageManager::new("~/.config/apirun/data.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(db_path: &str) -> Result<Self> {
        let path = database_file(db_path)?;
        let location = path.display().to_string();
        info!("Opening apirun database at {}", location);

        let url = format!("sqlite://{}?mode=rwc", location);
        Self::open(&url, 5, location).await
    }

    /// 内存数据库，只保留一个连接，否则每个连接各自一份空库
    pub async fn new_in_memory() -> Result<Self> {
        Self::open("sqlite::memory:", 1, ":memory:".to_string()).await
    }

    async fn open(url: &str, max_connections: u32, location: String) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StorageError::Open {
                path: location.clone(),
                reason: e.to_string(),
            })?;

        let manager = Self { pool, location };
        manager.create_schema().await?;
        Ok(manager)
    }

    /// 建表语句全部是 `IF NOT EXISTS`，重复打开同一个库是安全的
    async fn create_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        debug!("Schema ready for apirun database {}", self.location);
        Ok(())
    }

    /// 库中缺失的调度表
    pub async fn missing_tables(&self) -> Result<Vec<&'static str>> {
        let mut missing = Vec::new();
        for table in SCHEMA_TABLES {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                    .bind(table)
                    .fetch_one(&self.pool)
                    .await?;
            if count == 0 {
                missing.push(table);
            }
        }
        Ok(missing)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 数据库位置，内存库为 `:memory:`
    pub fn location(&self) -> &str {
        &self.location
    }

    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Closed apirun database {}", self.location);
    }

    /// 连接可用且调度表齐全
    pub async fn health_check(&self) -> Result<()> {
        let missing = self.missing_tables().await?;
        if !missing.is_empty() {
            return Err(StorageError::Migration(format!(
                "missing tables: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

fn database_file(db_path: &str) -> Result<PathBuf> {
    let path = PathBuf::from(shellexpand::tilde(db_path).as_ref());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent, &path)?;
    }
    Ok(path)
}

fn ensure_dir(dir: &Path, db_file: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| StorageError::Open {
        path: db_file.display().to_string(),
        reason: format!("cannot create directory {}: {}", dir.display(), e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_has_all_tables() {
        let storage = StorageManager::new_in_memory().await.unwrap();

        assert!(storage.missing_tables().await.unwrap().is_empty());
        assert_eq!(storage.location(), ":memory:");
        storage.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_health_check_reports_dropped_table() {
        let storage = StorageManager::new_in_memory().await.unwrap();
        sqlx::query("DROP TABLE execution_set_items")
            .execute(storage.pool())
            .await
            .unwrap();

        assert_eq!(
            storage.missing_tables().await.unwrap(),
            vec!["execution_set_items"]
        );
        let err = storage.health_check().await.unwrap_err();
        assert!(err.to_string().contains("execution_set_items"));
    }

    #[tokio::test]
    async fn test_file_database_created_and_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("apirun.db");
        let db_path = path.to_str().unwrap();

        let storage = StorageManager::new(db_path).await.unwrap();
        assert_eq!(storage.location(), db_path);
        sqlx::query("INSERT INTO project_settings (project_id, default_pool_id) VALUES ('proj', 'p1')")
            .execute(storage.pool())
            .await
            .unwrap();
        storage.close().await;
        assert!(path.exists());

        let reopened = StorageManager::new(db_path).await.unwrap();
        let (pool_id,): (String,) =
            sqlx::query_as("SELECT default_pool_id FROM project_settings WHERE project_id = 'proj'")
                .fetch_one(reopened.pool())
                .await
                .unwrap();
        assert_eq!(pool_id, "p1");
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let db_path = blocker.join("apirun.db");

        let result = StorageManager::new(db_path.to_str().unwrap()).await;
        assert!(matches!(result, Err(StorageError::Open { .. })));
    }
}
