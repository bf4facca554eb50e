//! APIRUN 传输层
//!
//! 负责把执行任务发送到资源池中的执行节点 (或容器编排器)，
//! 并把网络层的结果归类为: 确认 / 超时 / 节点错误。

pub mod client;
pub mod config;
pub mod task;

pub use client::{Ack, HttpWorkerTransport, WorkerTransport};
pub use config::TransportConfig;
pub use task::{
    ExecutionTask, PoolBinding, RunMode, RunModeConfig, TaskBatchRequest, TaskInfo, TaskRequest,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 传输层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("连接失败: {0}")]
    ConnectionFailed(String),

    /// 等待执行节点确认超时
    #[error("请求超时")]
    Timeout,

    /// 执行节点或编排器拒绝了任务
    #[error("执行节点拒绝任务 [{status}]: {message}")]
    Rejected {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("序列化错误: {0}")]
    SerdeError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),
}

impl TransportError {
    /// 是否为超时类错误
    ///
    /// 调用方把确认超时视为投递成功，避免同一任务被重复发送到两个节点。
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = e.status() {
            TransportError::Rejected {
                status: status.as_u16(),
                code: None,
                message: e.to_string(),
            }
        } else {
            TransportError::ConnectionFailed(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// 执行节点地址
///
/// 节点身份即 `ip:port` 字符串，同一次分发中端点相同的节点视为同一节点。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerEndpoint {
    pub ip: String,
    pub port: u16,
}

impl WorkerEndpoint {
    pub fn new(ip: &str, port: u16) -> Self {
        Self {
            ip: ip.to_string(),
            port,
        }
    }

    /// HTTP 基础地址
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

impl std::fmt::Display for WorkerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// 容器编排资源池描述
///
/// 编排器自行负责任务放置，分发端只提交期望的并发配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorDescriptor {
    /// 编排器 API 地址
    pub api_url: String,

    /// 访问令牌
    #[serde(default)]
    pub token: Option<String>,

    /// 命名空间
    pub namespace: String,

    /// 执行器部署名称
    pub deploy_name: String,

    /// 最大并发数
    #[serde(default = "default_orchestrated_concurrency")]
    pub concurrency_limit: u32,

    /// 单个 Pod 的线程数
    #[serde(default = "default_pod_threads")]
    pub pod_threads: u32,
}

fn default_orchestrated_concurrency() -> u32 {
    10
}

fn default_pod_threads() -> u32 {
    1
}
