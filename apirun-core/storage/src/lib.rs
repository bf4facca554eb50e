//! APIRUN 存储
//!
//! SQLite 实现的资源池注册表、分发结果记录和场景报告存储。

mod connection;
mod error;
mod models;
mod repositories;

pub use connection::StorageManager;
pub use error::{RecordKind, Result, StorageError};
pub use models::*;
pub use repositories::*;

use async_trait::async_trait;
use sqlx::SqlitePool;

use apirun_compiler::ReportStep;
use apirun_dispatcher::{
    DispatchError, ReportSink, ScenarioReport, ScenarioReportStore, TaskErrorKind,
};
use apirun_pool::{PoolError, PoolRegistry, ResourcePool};
use apirun_transport::PoolBinding;

/// 统一的数据访问层入口
pub struct Storage {
    _pool: SqlitePool,
    pools: PoolRepository,
    task_items: TaskItemRepository,
    reports: ScenarioReportRepository,
}

impl Storage {
    /// 从 StorageManager 创建 Storage
    pub fn from_manager(manager: &StorageManager) -> Self {
        let pool = manager.pool().clone();
        Self {
            _pool: pool.clone(),
            pools: PoolRepository::new(pool.clone()),
            task_items: TaskItemRepository::new(pool.clone()),
            reports: ScenarioReportRepository::new(pool),
        }
    }

    /// 获取资源池仓储
    pub fn pools(&self) -> &PoolRepository {
        &self.pools
    }

    /// 获取任务项仓储
    pub fn task_items(&self) -> &TaskItemRepository {
        &self.task_items
    }

    /// 获取场景报告仓储
    pub fn reports(&self) -> &ScenarioReportRepository {
        &self.reports
    }

    /// 获取数据库连接池
    pub fn pool(&self) -> &SqlitePool {
        &self._pool
    }
}

fn registry_error(e: StorageError) -> PoolError {
    PoolError::Registry(e.to_string())
}

fn sink_error(e: StorageError) -> DispatchError {
    DispatchError::Sink(e.to_string())
}

#[async_trait]
impl PoolRegistry for Storage {
    async fn get_pool(&self, pool_id: &str) -> apirun_pool::Result<Option<ResourcePool>> {
        self.pools.get(pool_id).await.map_err(registry_error)
    }

    async fn get_project_default_pool_id(
        &self,
        project_id: &str,
    ) -> apirun_pool::Result<Option<String>> {
        self.pools
            .get_project_default(project_id)
            .await
            .map_err(registry_error)
    }

    async fn is_project_authorized(
        &self,
        pool: &ResourcePool,
        project_id: &str,
    ) -> apirun_pool::Result<bool> {
        self.pools
            .is_granted(project_id, &pool.id)
            .await
            .map_err(registry_error)
    }
}

#[async_trait]
impl ReportSink for Storage {
    async fn record_placement(
        &self,
        task_id: &str,
        binding: &PoolBinding,
    ) -> apirun_dispatcher::Result<()> {
        self.task_items
            .update_placement(task_id, &binding.pool_id, binding.worker.as_deref())
            .await
            .map_err(sink_error)
    }

    async fn record_task_error(
        &self,
        task_id: &str,
        kind: TaskErrorKind,
    ) -> apirun_dispatcher::Result<()> {
        self.task_items
            .update_error(task_id, kind.as_str())
            .await
            .map_err(sink_error)
    }

    async fn record_batch_placement(
        &self,
        task_ids: &[String],
        binding: &PoolBinding,
    ) -> apirun_dispatcher::Result<()> {
        self.task_items
            .update_placement_batch(task_ids, &binding.pool_id, binding.worker.as_deref())
            .await
            .map_err(sink_error)
    }
}

#[async_trait]
impl ScenarioReportStore for Storage {
    async fn init_report(&self, report: &ScenarioReport) -> apirun_dispatcher::Result<bool> {
        self.reports
            .create_if_absent(&ScenarioReportRecord::from(report))
            .await
            .map_err(sink_error)
    }

    async fn init_report_steps(&self, steps: &[ReportStep]) -> apirun_dispatcher::Result<()> {
        let records: Vec<ReportStepRecord> = steps.iter().map(ReportStepRecord::from).collect();
        self.reports.insert_steps(&records).await.map_err(sink_error)
    }

    async fn remove_execution_set_item(
        &self,
        set_id: &str,
        item_id: &str,
    ) -> apirun_dispatcher::Result<()> {
        self.reports
            .remove_execution_set_item(set_id, item_id)
            .await
            .map(|_| ())
            .map_err(sink_error)
    }
}
