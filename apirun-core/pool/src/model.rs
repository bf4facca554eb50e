//! 资源池数据模型

use apirun_transport::{OrchestratorDescriptor, WorkerEndpoint};
use serde::{Deserialize, Serialize};

/// 资源池类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolType {
    /// 固定节点列表
    #[default]
    WorkerList,
    /// 容器编排 (由编排器负责放置)
    Orchestrated,
}

impl PoolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkerList => "WORKER_LIST",
            Self::Orchestrated => "ORCHESTRATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WORKER_LIST" | "NODE" => Some(Self::WorkerList),
            "ORCHESTRATED" | "K8S" => Some(Self::Orchestrated),
            _ => None,
        }
    }
}

/// 执行节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerNode {
    pub ip: String,
    pub port: u16,

    /// 节点最大并发
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: u32,

    /// 单任务并发，未配置时由分发器使用默认值
    #[serde(default)]
    pub per_task_concurrency_limit: Option<u32>,
}

fn default_concurrency_limit() -> u32 {
    1
}

impl WorkerNode {
    pub fn new(ip: &str, port: u16) -> Self {
        Self {
            ip: ip.to_string(),
            port,
            concurrency_limit: default_concurrency_limit(),
            per_task_concurrency_limit: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency_limit: u32, per_task: Option<u32>) -> Self {
        self.concurrency_limit = concurrency_limit;
        self.per_task_concurrency_limit = per_task;
        self
    }

    pub fn endpoint(&self) -> WorkerEndpoint {
        WorkerEndpoint::new(&self.ip, self.port)
    }

    /// 节点身份 (`ip:port`)
    pub fn key(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// 资源池
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePool {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub pool_type: PoolType,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub deleted: bool,

    /// 执行节点回调平台的地址，配置后覆盖任务中的地址
    #[serde(default)]
    pub server_url: Option<String>,

    #[serde(default)]
    pub workers: Vec<WorkerNode>,

    #[serde(default)]
    pub orchestrator: Option<OrchestratorDescriptor>,
}

fn default_true() -> bool {
    true
}

impl ResourcePool {
    pub fn worker_list(id: &str, workers: Vec<WorkerNode>) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            pool_type: PoolType::WorkerList,
            enabled: true,
            deleted: false,
            server_url: None,
            workers,
            orchestrator: None,
        }
    }

    pub fn orchestrated(id: &str, descriptor: OrchestratorDescriptor) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            pool_type: PoolType::Orchestrated,
            enabled: true,
            deleted: false,
            server_url: None,
            workers: Vec::new(),
            orchestrator: Some(descriptor),
        }
    }

    pub fn is_orchestrated(&self) -> bool {
        self.pool_type == PoolType::Orchestrated
    }

    /// 资源池本身是否可用 (不含项目授权)
    pub fn is_usable(&self) -> bool {
        if !self.enabled || self.deleted {
            return false;
        }
        match self.pool_type {
            PoolType::WorkerList => !self.workers.is_empty(),
            PoolType::Orchestrated => self.orchestrator.is_some(),
        }
    }

    /// 配置了非空回调地址时返回
    pub fn callback_url(&self) -> Option<&str> {
        self.server_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_type_parse() {
        assert_eq!(PoolType::parse("K8S"), Some(PoolType::Orchestrated));
        assert_eq!(PoolType::parse("WORKER_LIST"), Some(PoolType::WorkerList));
        assert_eq!(PoolType::parse("other"), None);
    }

    #[test]
    fn test_usable_pool() {
        let mut pool = ResourcePool::worker_list("p1", vec![WorkerNode::new("10.0.0.1", 8000)]);
        assert!(pool.is_usable());

        pool.enabled = false;
        assert!(!pool.is_usable());

        pool.enabled = true;
        pool.deleted = true;
        assert!(!pool.is_usable());

        let empty = ResourcePool::worker_list("p2", vec![]);
        assert!(!empty.is_usable());
    }

    #[test]
    fn test_callback_url_blank() {
        let mut pool = ResourcePool::worker_list("p1", vec![]);
        pool.server_url = Some("  ".to_string());
        assert!(pool.callback_url().is_none());

        pool.server_url = Some("http://ms:8081".to_string());
        assert_eq!(pool.callback_url(), Some("http://ms:8081"));
    }
}
