//! 执行任务项仓储
//!
//! 记录任务项实际使用的资源池/节点和错误标记

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;
use crate::models::TaskItemRecord;

/// 执行任务项仓储
pub struct TaskItemRepository {
    pool: SqlitePool,
}

impl TaskItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 记录任务项的资源池和节点
    pub async fn update_placement(
        &self,
        task_id: &str,
        pool_id: &str,
        node: Option<&str>,
    ) -> Result<()> {
        update_placement(&self.pool, task_id, pool_id, node).await?;
        debug!("Recorded placement of task item {}: {} {:?}", task_id, pool_id, node);
        Ok(())
    }

    /// 批量记录资源池和节点 (同一事务)
    pub async fn update_placement_batch(
        &self,
        task_ids: &[String],
        pool_id: &str,
        node: Option<&str>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for task_id in task_ids {
            update_placement(&mut *tx, task_id, pool_id, node).await?;
        }
        tx.commit().await?;

        debug!("Recorded placement of {} task items on {:?}", task_ids.len(), node);
        Ok(())
    }

    /// 记录任务项错误
    pub async fn update_error(&self, task_id: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO exec_task_items (id, error_message, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(task_id)
        .bind(error_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!("Recorded error {} of task item {}", error_message, task_id);
        Ok(())
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<TaskItemRecord>> {
        let record = sqlx::query_as::<_, TaskItemRecord>("SELECT * FROM exec_task_items WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// 有错误标记的任务项
    pub async fn list_errors(&self) -> Result<Vec<TaskItemRecord>> {
        let records = sqlx::query_as::<_, TaskItemRecord>(
            "SELECT * FROM exec_task_items WHERE error_message IS NOT NULL ORDER BY updated_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

async fn update_placement<'e, E>(
    executor: E,
    task_id: &str,
    pool_id: &str,
    node: Option<&str>,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO exec_task_items (id, resource_pool_id, resource_pool_node, updated_at) VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            resource_pool_id = excluded.resource_pool_id,
            resource_pool_node = excluded.resource_pool_node,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(task_id)
    .bind(pool_id)
    .bind(node)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}
