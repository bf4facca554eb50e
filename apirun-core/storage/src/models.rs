use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use apirun_compiler::ReportStep;
use apirun_dispatcher::ScenarioReport;
use apirun_pool::{PoolType, ResourcePool, WorkerNode};
use apirun_transport::OrchestratorDescriptor;

use crate::error::{RecordKind, Result, StorageError};

/// 资源池数据库模型
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PoolRecord {
    pub id: String,
    pub name: String,
    pub pool_type: String, // 'WORKER_LIST', 'ORCHESTRATED'
    pub enabled: bool,
    pub deleted: bool,
    pub server_url: Option<String>,
    pub orchestrator: Option<String>, // JSON
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PoolRecord {
    pub fn from_pool(pool: &ResourcePool) -> Result<Self> {
        let orchestrator = pool
            .orchestrator
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Utc::now();
        Ok(Self {
            id: pool.id.clone(),
            name: pool.name.clone(),
            pool_type: pool.pool_type.as_str().to_string(),
            enabled: pool.enabled,
            deleted: pool.deleted,
            server_url: pool.server_url.clone(),
            orchestrator,
            created_at: now,
            updated_at: now,
        })
    }

    /// 组装为资源池 (节点按 sort 排序后传入)
    pub fn into_pool(self, nodes: Vec<PoolNodeRecord>) -> Result<ResourcePool> {
        let pool_type = PoolType::parse(&self.pool_type).ok_or_else(|| StorageError::CorruptRecord {
            kind: RecordKind::ResourcePool,
            id: self.id.clone(),
            reason: format!("unknown pool type {}", self.pool_type),
        })?;
        let orchestrator = self
            .orchestrator
            .as_deref()
            .map(serde_json::from_str::<OrchestratorDescriptor>)
            .transpose()?;
        let workers = nodes
            .into_iter()
            .map(PoolNodeRecord::into_worker)
            .collect::<Result<Vec<_>>>()?;

        Ok(ResourcePool {
            id: self.id,
            name: self.name,
            pool_type,
            enabled: self.enabled,
            deleted: self.deleted,
            server_url: self.server_url,
            workers,
            orchestrator,
        })
    }
}

/// 资源池节点数据库模型
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PoolNodeRecord {
    pub id: i64,
    pub pool_id: String,
    pub ip: String,
    pub port: i64,
    pub concurrency_limit: i64,
    pub per_task_concurrency_limit: Option<i64>,
    pub sort: i64,
}

impl PoolNodeRecord {
    pub fn into_worker(self) -> Result<WorkerNode> {
        let port = u16::try_from(self.port).map_err(|_| StorageError::CorruptRecord {
            kind: RecordKind::PoolNode,
            id: format!("{}/{}", self.pool_id, self.ip),
            reason: format!("port {} out of range", self.port),
        })?;
        let per_task = self
            .per_task_concurrency_limit
            .and_then(|limit| u32::try_from(limit).ok());
        let concurrency = u32::try_from(self.concurrency_limit).unwrap_or(1);
        Ok(WorkerNode::new(&self.ip, port).with_concurrency(concurrency, per_task))
    }
}

/// 执行任务项数据库模型
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskItemRecord {
    pub id: String,
    pub resource_pool_id: Option<String>,
    pub resource_pool_node: Option<String>, // ip:port
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// 场景报告数据库模型
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScenarioReportRecord {
    pub id: String,
    pub scenario_id: String,
    pub project_id: String,
    pub name: String,
    pub task_item_id: String,
    pub environment_id: Option<String>,
    pub pool_id: Option<String>,
    pub trigger_mode: Option<String>,
    pub user_id: Option<String>,
    pub integrated: bool,
    pub waiting_time: Option<i64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ScenarioReport> for ScenarioReportRecord {
    fn from(report: &ScenarioReport) -> Self {
        Self {
            id: report.id.clone(),
            scenario_id: report.scenario_id.clone(),
            project_id: report.project_id.clone(),
            name: report.name.clone(),
            task_item_id: report.task_item_id.clone(),
            environment_id: report.environment_id.clone(),
            pool_id: report.pool_id.clone(),
            trigger_mode: report.trigger_mode.clone(),
            user_id: report.user_id.clone(),
            integrated: report.integrated,
            waiting_time: report.waiting_time.and_then(|t| i64::try_from(t).ok()),
            status: report.status.clone(),
            created_at: report.created_at,
        }
    }
}

/// 报告步骤数据库模型
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReportStepRecord {
    pub report_id: String,
    pub step_id: String,
    pub parent_id: Option<String>,
    pub sort: i64,
    pub name: String,
    pub step_type: String,
}

impl From<&ReportStep> for ReportStepRecord {
    fn from(step: &ReportStep) -> Self {
        Self {
            report_id: step.report_id.clone(),
            step_id: step.step_id.clone(),
            parent_id: step.parent_id.clone(),
            sort: i64::try_from(step.sort).unwrap_or(i64::MAX),
            name: step.name.clone(),
            step_type: step.step_type.as_str().to_string(),
        }
    }
}
