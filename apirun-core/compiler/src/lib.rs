//! APIRUN 场景编译器
//!
//! 把持久化的场景步骤树 (可能引用其他资源、部分覆盖、跨环境/项目)
//! 编译为可分发到执行节点的可执行树，并生成报告所需的元数据。

pub mod compiler;
pub mod config;
pub mod decode;
pub mod environment;
pub mod memory;
pub mod model;
pub mod report;
pub mod source;

pub use compiler::{step_unique_id, CompileContext, StepTreeCompiler, MAX_STEP_DEPTH};
pub use config::ScenarioConfig;
pub use environment::{EnvironmentIndex, EnvironmentMode};
pub use memory::{InMemoryBlobStore, InMemoryDefinitionCatalog, InMemoryEnvironmentService};
pub use model::{
    CompiledMeta, CompiledScenario, ElementBody, EnvBinding, ExecutableElement, HttpRequest,
    RefType, RootScenario, ScenarioBody, StepNode, StepType,
};
pub use report::{build_report_steps, request_count, ReportStep};
pub use source::{
    Blob, BlobStore, DefinitionCatalog, DefinitionExecuteInfo, Environment, EnvironmentService,
    ResourceKind, ScenarioBlob,
};

use thiserror::Error;

/// 编译错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// 被引用的资源已删除
    #[error("{kind}不存在: {id}")]
    ResourceNotFound { kind: ResourceKind, id: String },

    #[error("步骤层级超过 {0}")]
    TooDeep(usize),

    /// 数据源访问失败
    #[error("数据源错误: {0}")]
    Source(String),
}

pub type Result<T> = std::result::Result<T, CompileError>;
