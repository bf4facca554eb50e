//! 资源池仓储
//!
//! 资源池、节点、项目授权和项目默认资源池

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use apirun_pool::{ResourcePool, WorkerNode};

use crate::error::{RecordKind, Result, StorageError};
use crate::models::{PoolNodeRecord, PoolRecord};

/// 资源池仓储
pub struct PoolRepository {
    pool: SqlitePool,
}

impl PoolRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 插入或更新资源池记录 (不含节点)
    pub async fn upsert(&self, record: &PoolRecord) -> Result<()> {
        upsert_pool(&self.pool, record).await?;
        debug!("Upserted resource pool: {}", record.id);
        Ok(())
    }

    /// 保存资源池及其节点，资源池记录和节点列表在同一事务中整体替换
    pub async fn save(&self, pool: &ResourcePool) -> Result<()> {
        let record = PoolRecord::from_pool(pool)?;

        let mut tx = self.pool.begin().await?;
        upsert_pool(&mut *tx, &record).await?;
        sqlx::query("DELETE FROM resource_pool_nodes WHERE pool_id = ?")
            .bind(&pool.id)
            .execute(&mut *tx)
            .await?;
        for (sort, worker) in pool.workers.iter().enumerate() {
            insert_node(&mut tx, &pool.id, worker, sort as i64).await?;
        }
        tx.commit().await?;

        debug!("Saved resource pool {} with {} nodes", pool.id, pool.workers.len());
        Ok(())
    }

    /// 追加节点到资源池末尾
    pub async fn add_node(&self, pool_id: &str, worker: &WorkerNode) -> Result<()> {
        if self.get_record(pool_id).await?.is_none() {
            return Err(StorageError::not_found(RecordKind::ResourcePool, pool_id));
        }

        let mut tx = self.pool.begin().await?;
        let (next_sort,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(sort) + 1, 0) FROM resource_pool_nodes WHERE pool_id = ?",
        )
        .bind(pool_id)
        .fetch_one(&mut *tx)
        .await?;
        insert_node(&mut tx, pool_id, worker, next_sort).await?;
        tx.commit().await?;

        debug!("Added node {} to resource pool {}", worker.key(), pool_id);
        Ok(())
    }

    /// 删除节点
    pub async fn remove_node(&self, pool_id: &str, ip: &str, port: u16) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM resource_pool_nodes WHERE pool_id = ? AND ip = ? AND port = ?")
                .bind(pool_id)
                .bind(ip)
                .bind(i64::from(port))
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 根据 ID 获取资源池记录
    pub async fn get_record(&self, id: &str) -> Result<Option<PoolRecord>> {
        let record = sqlx::query_as::<_, PoolRecord>("SELECT * FROM resource_pools WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// 资源池节点 (按配置顺序)
    pub async fn list_nodes(&self, pool_id: &str) -> Result<Vec<PoolNodeRecord>> {
        let nodes = sqlx::query_as::<_, PoolNodeRecord>(
            "SELECT * FROM resource_pool_nodes WHERE pool_id = ? ORDER BY sort, id",
        )
        .bind(pool_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(nodes)
    }

    /// 根据 ID 获取资源池 (含节点)
    pub async fn get(&self, id: &str) -> Result<Option<ResourcePool>> {
        let Some(record) = self.get_record(id).await? else {
            return Ok(None);
        };
        let nodes = self.list_nodes(id).await?;
        Ok(Some(record.into_pool(nodes)?))
    }

    /// 获取所有资源池 (含已删除)
    pub async fn list_all(&self) -> Result<Vec<ResourcePool>> {
        let records =
            sqlx::query_as::<_, PoolRecord>("SELECT * FROM resource_pools ORDER BY name, id")
                .fetch_all(&self.pool)
                .await?;

        let mut pools = Vec::with_capacity(records.len());
        for record in records {
            let nodes = self.list_nodes(&record.id).await?;
            pools.push(record.into_pool(nodes)?);
        }
        Ok(pools)
    }

    /// 启用/禁用资源池
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE resource_pools SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 逻辑删除资源池
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE resource_pools SET deleted = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 授权项目使用资源池
    pub async fn grant(&self, project_id: &str, pool_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO project_pool_grants (project_id, pool_id) VALUES (?, ?)")
            .bind(project_id)
            .bind(pool_id)
            .execute(&self.pool)
            .await?;

        debug!("Granted resource pool {} to project {}", pool_id, project_id);
        Ok(())
    }

    /// 撤销授权
    pub async fn revoke(&self, project_id: &str, pool_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM project_pool_grants WHERE project_id = ? AND pool_id = ?")
            .bind(project_id)
            .bind(pool_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_granted(&self, project_id: &str, pool_id: &str) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM project_pool_grants WHERE project_id = ? AND pool_id = ?",
        )
        .bind(project_id)
        .bind(pool_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// 设置项目默认资源池，同时授权
    pub async fn set_project_default(&self, project_id: &str, pool_id: &str) -> Result<()> {
        self.grant(project_id, pool_id).await?;
        sqlx::query(
            r#"
            INSERT INTO project_settings (project_id, default_pool_id) VALUES (?, ?)
            ON CONFLICT(project_id) DO UPDATE SET default_pool_id = excluded.default_pool_id
            "#,
        )
        .bind(project_id)
        .bind(pool_id)
        .execute(&self.pool)
        .await?;

        debug!("Set default resource pool of project {} to {}", project_id, pool_id);
        Ok(())
    }

    pub async fn get_project_default(&self, project_id: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT default_pool_id FROM project_settings WHERE project_id = ?")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(id,)| id))
    }
}

async fn upsert_pool<'e, E>(executor: E, record: &PoolRecord) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO resource_pools (id, name, pool_type, enabled, deleted, server_url, orchestrator, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            pool_type = excluded.pool_type,
            enabled = excluded.enabled,
            deleted = excluded.deleted,
            server_url = excluded.server_url,
            orchestrator = excluded.orchestrator,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&record.id)
    .bind(&record.name)
    .bind(&record.pool_type)
    .bind(record.enabled)
    .bind(record.deleted)
    .bind(&record.server_url)
    .bind(&record.orchestrator)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

async fn insert_node(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    pool_id: &str,
    worker: &WorkerNode,
    sort: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO resource_pool_nodes (pool_id, ip, port, concurrency_limit, per_task_concurrency_limit, sort)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(pool_id, ip, port) DO UPDATE SET
            concurrency_limit = excluded.concurrency_limit,
            per_task_concurrency_limit = excluded.per_task_concurrency_limit
        "#,
    )
    .bind(pool_id)
    .bind(&worker.ip)
    .bind(i64::from(worker.port))
    .bind(i64::from(worker.concurrency_limit))
    .bind(worker.per_task_concurrency_limit.map(i64::from))
    .bind(sort)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
