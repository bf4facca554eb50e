//! 场景包
//!
//! 一个 YAML/JSON 文件包含场景步骤树及其依赖的资源内容、环境和接口目录，
//! 命令行据此构造内存数据源进行编译和分发。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use apirun_compiler::{
    CompileContext, DefinitionExecuteInfo, Environment, InMemoryBlobStore,
    InMemoryDefinitionCatalog, InMemoryEnvironmentService, ResourceKind, RootScenario, StepNode,
    StepTreeCompiler,
};

/// 场景包
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioBundle {
    pub scenario: RootScenario,

    /// 场景级环境 ID
    #[serde(default)]
    pub environment_id: Option<String>,

    #[serde(default)]
    pub grouped: bool,

    #[serde(default)]
    pub steps: Vec<StepNode>,

    /// 前端传入的未保存步骤详情 (步骤 ID -> 内容)
    #[serde(default)]
    pub step_details: HashMap<String, Value>,

    #[serde(default)]
    pub blobs: Vec<BundleBlob>,

    #[serde(default)]
    pub environments: Vec<Environment>,

    /// 环境组 ID -> 成员环境 ID
    #[serde(default)]
    pub environment_groups: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub definitions: Vec<BundleDefinition>,
}

/// 资源内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleBlob {
    pub kind: ResourceKind,
    pub id: String,
    /// 字符串原样保存，其他值序列化为 JSON
    pub content: Value,
}

/// 接口目录条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleDefinition {
    pub kind: ResourceKind,
    #[serde(flatten)]
    pub info: DefinitionExecuteInfo,
}

impl ScenarioBundle {
    /// 加载场景包，`.json` 按 JSON 解析，其余按 YAML 解析
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("读取场景包失败: {:?}", path))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(&content).with_context(|| format!("解析场景包失败: {:?}", path))
        } else {
            serde_yaml::from_str(&content).with_context(|| format!("解析场景包失败: {:?}", path))
        }
    }

    /// 基于场景包内容构造编译器
    pub fn compiler(&self) -> StepTreeCompiler {
        let mut blobs = InMemoryBlobStore::new();
        for blob in &self.blobs {
            let content = match &blob.content {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            blobs.insert(blob.kind, &blob.id, content);
        }

        let mut environments = InMemoryEnvironmentService::new();
        for environment in &self.environments {
            environments.add_environment(environment.clone());
        }
        for (group_id, members) in &self.environment_groups {
            environments.add_group(group_id, members.clone());
        }

        let mut catalog = InMemoryDefinitionCatalog::new();
        for definition in &self.definitions {
            catalog.insert(definition.kind, definition.info.clone());
        }

        StepTreeCompiler::new(Arc::new(blobs), Arc::new(environments), Arc::new(catalog))
    }

    /// 编译上下文
    pub fn context(&self, report_id: Option<String>) -> CompileContext {
        CompileContext {
            environment_id: self.environment_id.clone(),
            grouped: self.grouped,
            step_details: self.step_details.clone(),
            report_id,
        }
    }

    /// 场景所属项目
    pub fn project_id(&self) -> Option<&str> {
        self.scenario.project_id.as_deref()
    }
}
