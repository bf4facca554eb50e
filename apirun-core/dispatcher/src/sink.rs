//! 分发结果与报告的持久化接口

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use apirun_compiler::ReportStep;
use apirun_transport::PoolBinding;

use crate::Result;

/// 任务项错误标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskErrorKind {
    /// 资源池无可用节点或未配置
    InvalidResourcePool,
    /// 用例已删除
    CaseNotExist,
}

impl TaskErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidResourcePool => "INVALID_RESOURCE_POOL",
            Self::CaseNotExist => "CASE_NOT_EXIST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INVALID_RESOURCE_POOL" => Some(Self::InvalidResourcePool),
            "CASE_NOT_EXIST" => Some(Self::CaseNotExist),
            _ => None,
        }
    }
}

/// 分发结果记录
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// 记录任务实际使用的资源池和节点
    async fn record_placement(&self, task_id: &str, binding: &PoolBinding) -> Result<()>;

    /// 记录任务项错误
    async fn record_task_error(&self, task_id: &str, kind: TaskErrorKind) -> Result<()>;

    async fn record_batch_placement(&self, task_ids: &[String], binding: &PoolBinding) -> Result<()> {
        for task_id in task_ids {
            self.record_placement(task_id, binding).await?;
        }
        Ok(())
    }

    async fn record_batch_task_error(&self, task_ids: &[String], kind: TaskErrorKind) -> Result<()> {
        for task_id in task_ids {
            self.record_task_error(task_id, kind).await?;
        }
        Ok(())
    }
}

/// 场景报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
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
    /// 场景前置等待时间 (毫秒)
    pub waiting_time: Option<u64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// 场景报告存储
#[async_trait]
pub trait ScenarioReportStore: Send + Sync {
    /// 创建报告，报告 ID 已存在时不做任何修改并返回 false
    async fn init_report(&self, report: &ScenarioReport) -> Result<bool>;

    async fn init_report_steps(&self, steps: &[ReportStep]) -> Result<()>;

    /// 从执行集合中移除任务项 (集合报告中用例被删除时)
    async fn remove_execution_set_item(&self, set_id: &str, item_id: &str) -> Result<()>;
}

/// 内存实现 (测试和预览使用)
#[derive(Default)]
pub struct InMemoryReportSink {
    placements: RwLock<HashMap<String, PoolBinding>>,
    errors: RwLock<Vec<(String, TaskErrorKind)>>,
    reports: RwLock<HashMap<String, ScenarioReport>>,
    report_steps: RwLock<Vec<ReportStep>>,
    removed_items: RwLock<Vec<(String, String)>>,
}

impl InMemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn placement(&self, task_id: &str) -> Option<PoolBinding> {
        self.placements.read().await.get(task_id).cloned()
    }

    pub async fn placement_count(&self) -> usize {
        self.placements.read().await.len()
    }

    pub async fn errors(&self) -> Vec<(String, TaskErrorKind)> {
        self.errors.read().await.clone()
    }

    pub async fn reports(&self) -> Vec<ScenarioReport> {
        self.reports.read().await.values().cloned().collect()
    }

    pub async fn report_steps(&self) -> Vec<ReportStep> {
        self.report_steps.read().await.clone()
    }

    pub async fn removed_items(&self) -> Vec<(String, String)> {
        self.removed_items.read().await.clone()
    }
}

#[async_trait]
impl ReportSink for InMemoryReportSink {
    async fn record_placement(&self, task_id: &str, binding: &PoolBinding) -> Result<()> {
        self.placements
            .write()
            .await
            .insert(task_id.to_string(), binding.clone());
        Ok(())
    }

    async fn record_task_error(&self, task_id: &str, kind: TaskErrorKind) -> Result<()> {
        self.errors.write().await.push((task_id.to_string(), kind));
        Ok(())
    }
}

#[async_trait]
impl ScenarioReportStore for InMemoryReportSink {
    async fn init_report(&self, report: &ScenarioReport) -> Result<bool> {
        let mut reports = self.reports.write().await;
        if reports.contains_key(&report.id) {
            return Ok(false);
        }
        reports.insert(report.id.clone(), report.clone());
        Ok(true)
    }

    async fn init_report_steps(&self, steps: &[ReportStep]) -> Result<()> {
        let mut stored = self.report_steps.write().await;
        for step in steps {
            let exists = stored
                .iter()
                .any(|s| s.report_id == step.report_id && s.step_id == step.step_id);
            if !exists {
                stored.push(step.clone());
            }
        }
        Ok(())
    }

    async fn remove_execution_set_item(&self, set_id: &str, item_id: &str) -> Result<()> {
        self.removed_items
            .write()
            .await
            .push((set_id.to_string(), item_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_str() {
        for kind in [TaskErrorKind::InvalidResourcePool, TaskErrorKind::CaseNotExist] {
            assert_eq!(TaskErrorKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TaskErrorKind::parse("OTHER"), None);
    }

    #[tokio::test]
    async fn test_batch_defaults_loop() {
        let sink = InMemoryReportSink::new();
        let binding = PoolBinding {
            pool_id: "p1".into(),
            worker: Some("10.0.0.1:8000".into()),
        };
        sink.record_batch_placement(&["t1".into(), "t2".into()], &binding)
            .await
            .unwrap();
        assert_eq!(sink.placement_count().await, 2);
        assert_eq!(sink.placement("t2").await, Some(binding));
    }
}
