//! APIRUN 资源池
//!
//! - 资源池解析: 项目 + 可选资源池 ID -> 校验过的资源池
//! - 节点选择: 每个资源池一个轮询游标
//! - 批量分片: 按当前节点数把任务切成近似等长的分片

pub mod model;
pub mod registry;
pub mod resolver;
pub mod selector;
pub mod shard;

pub use model::{PoolType, ResourcePool, WorkerNode};
pub use registry::{InMemoryPoolRegistry, PoolRegistry};
pub use resolver::PoolResolver;
pub use selector::{NodeSelector, RoundRobinCursor, SelectionStrategy, SelectorConfig};
pub use shard::shard_tasks;

use thiserror::Error;

/// 资源池错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    /// 资源池未配置、已禁用、已删除或项目无权使用
    ///
    /// 不区分具体原因，处理方式都是由管理员修正资源池配置。
    #[error("未配置可用的执行资源池")]
    NotConfigured,

    /// 资源池没有任何执行节点
    #[error("资源池 {0} 没有可用节点")]
    NoWorkers(String),

    /// 资源池注册表访问失败
    #[error("资源池注册表错误: {0}")]
    Registry(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
