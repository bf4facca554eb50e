//! 编译器依赖的外部数据源

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::Result;

/// 资源种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    /// 接口定义
    Definition,
    /// 接口用例
    Case,
    /// 场景
    Scenario,
    /// 场景步骤详情
    Step,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Definition => "接口定义",
            Self::Case => "接口用例",
            Self::Scenario => "场景",
            Self::Step => "场景步骤",
        };
        write!(f, "{}", name)
    }
}

/// 持久化内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub id: String,
    pub content: String,
}

impl Blob {
    pub fn new(id: &str, content: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            content: content.into(),
        }
    }
}

/// 内容存储，按资源种类批量查询
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 不存在的 ID 不出现在结果中
    async fn get_blobs(&self, kind: ResourceKind, ids: &[String]) -> Result<Vec<Blob>>;
}

/// 环境
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: String,
    pub project_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub config: Value,
}

/// 环境服务
#[async_trait]
pub trait EnvironmentService: Send + Sync {
    async fn get_environments(&self, ids: &[String]) -> Result<Vec<Environment>>;

    /// 环境组 ID -> 组内环境 ID
    async fn get_environment_group_members(
        &self,
        group_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>>;
}

/// 接口执行信息 (所属模块、请求方法、路径)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionExecuteInfo {
    pub resource_id: String,

    #[serde(default)]
    pub module_id: Option<String>,

    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub path: Option<String>,
}

/// 接口目录
#[async_trait]
pub trait DefinitionCatalog: Send + Sync {
    /// `kind` 为 Definition 或 Case
    async fn get_execute_info(
        &self,
        kind: ResourceKind,
        ids: &[String],
    ) -> Result<Vec<DefinitionExecuteInfo>>;
}

/// 被引用场景的内容: 场景自身的环境和场景配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioBlob {
    #[serde(default)]
    pub environment_id: Option<String>,

    #[serde(default)]
    pub grouped: bool,

    #[serde(default)]
    pub config: Option<Value>,
}
