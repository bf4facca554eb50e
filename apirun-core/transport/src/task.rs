//! 执行任务载荷
//!
//! 分发端发送给执行节点的请求体。字段使用 camelCase，与执行节点侧约定一致。

use serde::{Deserialize, Serialize};

/// 执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    /// 正式执行，记录节点放置信息和错误标记
    #[default]
    Run,
    /// 后端调试，通过节点的调试接口执行，不落库
    BackendDebug,
    /// 前端调试，只返回执行参数，由前端调用本地资源池
    FrontendDebug,
}

impl RunMode {
    pub fn is_debug(&self) -> bool {
        matches!(self, Self::BackendDebug | Self::FrontendDebug)
    }

    pub fn is_frontend_debug(&self) -> bool {
        matches!(self, Self::FrontendDebug)
    }
}

/// 运行配置 (由触发方指定，可覆盖用例自身配置)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunModeConfig {
    /// 显式指定的资源池，为空则使用项目默认资源池
    #[serde(default)]
    pub pool_id: Option<String>,

    /// 环境 ID，为空或 "NONE" 时使用用例自身环境
    #[serde(default)]
    pub environment_id: Option<String>,

    /// 环境 ID 是否为环境组
    #[serde(default)]
    pub grouped: bool,

    /// 是否为集合报告 (测试计划/批量执行)
    #[serde(default)]
    pub integrated_report: bool,

    /// 失败重试
    #[serde(default)]
    pub retry_on_fail: bool,
}

/// 任务公共信息 (同一次运行内所有任务共享)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_id: String,
    pub project_id: String,

    #[serde(default)]
    pub run_mode: RunMode,

    #[serde(default)]
    pub run_mode_config: RunModeConfig,

    /// 实际使用的资源池
    #[serde(default)]
    pub pool_id: Option<String>,

    /// 执行节点回调平台的地址
    #[serde(default)]
    pub ms_url: Option<String>,

    /// 节点最大并发
    #[serde(default)]
    pub pool_size: u32,

    /// 单任务并发
    #[serde(default)]
    pub per_task_size: u32,

    #[serde(default)]
    pub save_result: bool,

    #[serde(default)]
    pub real_time: bool,

    #[serde(default)]
    pub trigger_mode: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub resource_type: Option<String>,
}

impl TaskInfo {
    pub fn new(task_id: &str, project_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            project_id: project_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }
}

/// 任务实际落到的资源池和节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolBinding {
    pub pool_id: String,
    /// `ip:port`，编排资源池为空
    pub worker: Option<String>,
}

/// 一个可分发的执行单元
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTask {
    /// 任务项 ID
    pub id: String,

    /// 报告 ID，调用方在分发前预先生成，重试发送时保持不变
    #[serde(default)]
    pub report_id: Option<String>,

    pub resource_id: String,

    #[serde(default = "default_request_count")]
    pub request_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_binding: Option<PoolBinding>,

    /// 编译后的执行树
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

fn default_request_count() -> u64 {
    1
}

impl ExecutionTask {
    pub fn new(id: &str, resource_id: &str) -> Self {
        Self {
            id: id.to_string(),
            resource_id: resource_id.to_string(),
            request_count: default_request_count(),
            ..Default::default()
        }
    }

    pub fn with_report_id(mut self, report_id: &str) -> Self {
        self.report_id = Some(report_id.to_string());
        self
    }

    pub fn with_request_count(mut self, request_count: u64) -> Self {
        self.request_count = request_count;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// 报告 ID 是否还未生成
    pub fn needs_report_id(&self) -> bool {
        self.report_id
            .as_deref()
            .map(|id| id.trim().is_empty())
            .unwrap_or(true)
    }
}

/// 单任务请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub task_info: TaskInfo,
    pub task_item: ExecutionTask,
}

impl TaskRequest {
    pub fn new(task_info: TaskInfo, task_item: ExecutionTask) -> Self {
        Self {
            task_info,
            task_item,
        }
    }
}

/// 批量任务请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBatchRequest {
    pub task_info: TaskInfo,
    pub task_items: Vec<ExecutionTask>,
}

impl TaskBatchRequest {
    pub fn new(task_info: TaskInfo, task_items: Vec<ExecutionTask>) -> Self {
        Self {
            task_info,
            task_items,
        }
    }

    /// 任务项 ID (保持请求中的顺序)
    pub fn task_ids(&self) -> Vec<String> {
        self.task_items.iter().map(|t| t.id.clone()).collect()
    }
}
