//! 场景报告仓储

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;
use crate::models::{ReportStepRecord, ScenarioReportRecord};

/// 场景报告仓储
pub struct ScenarioReportRepository {
    pool: SqlitePool,
}

impl ScenarioReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 创建报告，报告 ID 已存在时忽略
    ///
    /// 返回是否新建。
    pub async fn create_if_absent(&self, report: &ScenarioReportRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO scenario_reports
            (id, scenario_id, project_id, name, task_item_id, environment_id, pool_id,
             trigger_mode, user_id, integrated, waiting_time, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.id)
        .bind(&report.scenario_id)
        .bind(&report.project_id)
        .bind(&report.name)
        .bind(&report.task_item_id)
        .bind(&report.environment_id)
        .bind(&report.pool_id)
        .bind(&report.trigger_mode)
        .bind(&report.user_id)
        .bind(report.integrated)
        .bind(report.waiting_time)
        .bind(&report.status)
        .bind(report.created_at)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        debug!("Init scenario report {} (created: {})", report.id, created);
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ScenarioReportRecord>> {
        let record =
            sqlx::query_as::<_, ScenarioReportRecord>("SELECT * FROM scenario_reports WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scenario_reports")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// 写入报告步骤，已存在的步骤保持不变
    pub async fn insert_steps(&self, steps: &[ReportStepRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for step in steps {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO scenario_report_steps
                (report_id, step_id, parent_id, sort, name, step_type)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&step.report_id)
            .bind(&step.step_id)
            .bind(&step.parent_id)
            .bind(step.sort)
            .bind(&step.name)
            .bind(&step.step_type)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("Inserted {} report steps", steps.len());
        Ok(())
    }

    /// 报告步骤，按父步骤和同级顺序排列
    pub async fn list_steps(&self, report_id: &str) -> Result<Vec<ReportStepRecord>> {
        let steps = sqlx::query_as::<_, ReportStepRecord>(
            "SELECT * FROM scenario_report_steps WHERE report_id = ? ORDER BY parent_id, sort",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(steps)
    }

    /// 加入执行集合
    pub async fn add_execution_set_item(&self, set_id: &str, item_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO execution_set_items (set_id, item_id) VALUES (?, ?)")
            .bind(set_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove_execution_set_item(&self, set_id: &str, item_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM execution_set_items WHERE set_id = ? AND item_id = ?")
            .bind(set_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        debug!("Removed item {} from execution set {}", item_id, set_id);
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_execution_set_items(&self, set_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT item_id FROM execution_set_items WHERE set_id = ? ORDER BY item_id")
                .bind(set_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
