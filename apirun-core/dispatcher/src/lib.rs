//! APIRUN 任务分发
//!
//! - 单任务分发: 轮询选择节点，节点失败时在本次调用内转移到其他节点
//! - 批量分发: 按节点数分片，分片与节点同步推进，失败节点在本次调用内剔除
//! - 编排资源池: 直接提交给编排器，不做节点级重试
//! - 场景执行: 编译步骤树、初始化报告后分发

pub mod config;
pub mod dispatcher;
pub mod runner;
pub mod sink;

pub use config::DispatchConfig;
pub use dispatcher::{BatchDispatch, Dispatcher, ShardOutcome, ShardStatus};
pub use runner::{effective_environment, ScenarioRunRequest, ScenarioRunner, NONE_ENVIRONMENT};
pub use sink::{
    InMemoryReportSink, ReportSink, ScenarioReport, ScenarioReportStore, TaskErrorKind,
};

use apirun_compiler::{CompileError, ResourceKind};
use apirun_pool::PoolError;
use apirun_transport::TransportError;
use thiserror::Error;

/// 分发错误
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    /// 资源池未配置、不可用或项目无权使用，不重试
    #[error("未配置可用的执行资源池")]
    PoolNotConfigured,

    /// 资源池无效 (测试计划执行、批量调试)
    #[error("执行资源池无效")]
    InvalidResourcePool,

    /// 资源池内所有节点都已尝试且失败
    #[error("没有可用的执行资源")]
    ResourceExhausted { source: TransportError },

    #[error("资源池执行失败: {0}")]
    ResourcePoolExecute(String),

    /// 场景或被引用的资源已删除
    #[error("用例不存在: {kind} {id}")]
    CaseNotExist { kind: ResourceKind, id: String },

    #[error("编译失败: {0}")]
    Compile(CompileError),

    #[error("执行载荷序列化失败: {0}")]
    Payload(String),

    #[error("报告写入失败: {0}")]
    Sink(String),

    #[error("资源池注册表错误: {0}")]
    Registry(String),
}

impl From<PoolError> for DispatchError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::NotConfigured | PoolError::NoWorkers(_) => DispatchError::PoolNotConfigured,
            PoolError::Registry(msg) => DispatchError::Registry(msg),
        }
    }
}

impl From<CompileError> for DispatchError {
    fn from(e: CompileError) -> Self {
        match e {
            CompileError::ResourceNotFound { kind, id } => DispatchError::CaseNotExist { kind, id },
            other => DispatchError::Compile(other),
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        DispatchError::Payload(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
