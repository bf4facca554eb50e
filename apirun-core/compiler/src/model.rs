//! 步骤树与可执行树模型

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::source::{Environment, ResourceKind};

/// 步骤类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    /// 接口定义
    Api,
    /// 接口用例
    ApiCase,
    /// 场景
    ApiScenario,
    /// 自定义请求
    CustomRequest,
    /// 脚本
    Script,
    IfController,
    LoopController,
    OnceOnlyController,
    /// 等待
    ConstantTimer,
    #[serde(other)]
    Unknown,
}

impl StepType {
    /// 是否为请求类步骤 (计入请求总数)
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Api | Self::ApiCase | Self::CustomRequest)
    }

    pub fn is_scenario(&self) -> bool {
        matches!(self, Self::ApiScenario)
    }

    pub fn is_controller(&self) -> bool {
        matches!(
            self,
            Self::IfController | Self::LoopController | Self::OnceOnlyController
        )
    }

    /// 引用该类型步骤时对应的资源种类
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match self {
            Self::Api => Some(ResourceKind::Definition),
            Self::ApiCase => Some(ResourceKind::Case),
            Self::ApiScenario => Some(ResourceKind::Scenario),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "API",
            Self::ApiCase => "API_CASE",
            Self::ApiScenario => "API_SCENARIO",
            Self::CustomRequest => "CUSTOM_REQUEST",
            Self::Script => "SCRIPT",
            Self::IfController => "IF_CONTROLLER",
            Self::LoopController => "LOOP_CONTROLLER",
            Self::OnceOnlyController => "ONCE_ONLY_CONTROLLER",
            Self::ConstantTimer => "CONSTANT_TIMER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// 引用方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefType {
    /// 直接创建的步骤，内容在步骤详情中
    #[default]
    Direct,
    /// 完全引用，内容取自被引用资源
    #[serde(alias = "REF")]
    FullRef,
    /// 部分引用；接口/用例步骤表示复制
    #[serde(alias = "COPY")]
    PartialRef,
}

impl RefType {
    pub fn is_ref_or_partial_ref(&self) -> bool {
        matches!(self, Self::FullRef | Self::PartialRef)
    }
}

/// 复制的接口/用例 (保留自身的请求方法和路径)
pub fn is_copy_api(step_type: StepType, ref_type: RefType) -> bool {
    ref_type == RefType::PartialRef && matches!(step_type, StepType::Api | StepType::ApiCase)
}

/// 完全引用的接口/用例 (文件复用被引用资源的文件)
pub fn is_ref_api(step_type: StepType, ref_type: RefType) -> bool {
    ref_type == RefType::FullRef && matches!(step_type, StepType::Api | StepType::ApiCase)
}

/// 场景步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepNode {
    /// 步骤 ID，用于查询步骤详情
    pub id: String,

    /// 运行期唯一 ID，关联报告步骤
    #[serde(default)]
    pub unique_id: Option<String>,

    #[serde(default)]
    pub name: String,

    pub step_type: StepType,

    #[serde(default)]
    pub ref_type: RefType,

    /// 被引用资源 ID
    #[serde(default)]
    pub resource_id: Option<String>,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub children: Vec<StepNode>,

    /// 场景步骤的运行参数
    #[serde(default)]
    pub config: Option<Value>,
}

fn default_true() -> bool {
    true
}

impl StepNode {
    pub fn new(id: &str, step_type: StepType) -> Self {
        Self {
            id: id.to_string(),
            unique_id: None,
            name: id.to_string(),
            step_type,
            ref_type: RefType::Direct,
            resource_id: None,
            project_id: None,
            enabled: true,
            children: Vec::new(),
            config: None,
        }
    }

    pub fn with_ref(mut self, ref_type: RefType, resource_id: &str) -> Self {
        self.ref_type = ref_type;
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn with_children(mut self, children: Vec<StepNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_unique_id(mut self, unique_id: &str) -> Self {
        self.unique_id = Some(unique_id.to_string());
        self
    }

    pub fn with_project(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// 非空的唯一 ID
    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    /// 非空的被引用资源 ID
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }
}

/// 场景根节点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootScenario {
    /// 场景 ID
    pub resource_id: String,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub name: String,

    /// 场景配置
    #[serde(default)]
    pub config: Option<Value>,
}

/// HTTP 请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub method: String,
    pub path: String,

    /// 所属模块，编译后由接口目录补全
    #[serde(default)]
    pub module_id: Option<String>,

    #[serde(default)]
    pub protocol: Option<String>,

    /// 请求头、请求体等其余内容原样透传
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 脚本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptBody {
    #[serde(default = "default_script_language")]
    pub language: String,
    pub script: String,
}

fn default_script_language() -> String {
    "beanshell-jsr223".to_string()
}

/// 逻辑控制器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerBody {
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

/// 等待
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitBody {
    /// 毫秒
    pub delay: u64,
}

/// 场景环境绑定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvBinding {
    /// 单个环境
    Single { environment: Environment },
    /// 环境组，按项目展开
    #[serde(rename_all = "camelCase")]
    Group {
        group_id: String,
        project_env_map: BTreeMap<String, Environment>,
    },
}

/// 场景 (根场景或引用的子场景)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioBody {
    #[serde(default)]
    pub environment: Option<EnvBinding>,

    /// 引用步骤上的运行参数覆盖
    #[serde(default)]
    pub step_config: Option<Value>,

    #[serde(default)]
    pub config: Option<Value>,
}

/// 元素内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementBody {
    Http(HttpRequest),
    Script(ScriptBody),
    Controller(ControllerBody),
    Scenario(ScenarioBody),
    Wait(WaitBody),
}

/// 可执行元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableElement {
    /// 对应步骤的唯一 ID
    pub step_id: String,

    #[serde(default)]
    pub resource_id: Option<String>,

    #[serde(default)]
    pub project_id: Option<String>,

    pub name: String,

    pub step_type: StepType,

    pub ref_type: RefType,

    pub body: ElementBody,

    #[serde(default)]
    pub children: Vec<ExecutableElement>,
}

impl ExecutableElement {
    /// 元素总数 (含自身)
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(ExecutableElement::len).sum::<usize>()
    }

    /// 深度优先遍历
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a ExecutableElement)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    pub(crate) fn walk_mut(&mut self, f: &mut dyn FnMut(&mut ExecutableElement)) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }
}

/// 编译附带的元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledMeta {
    /// 实际编入执行树的请求类步骤数
    ///
    /// 内容无法解析而被跳过的请求步骤不计入，因此可能小于
    /// [`crate::report::request_count`] 按步骤树统计的结果。执行节点只会回报
    /// 这里计入的请求，任务项的请求数和完成判断都以此为准。
    pub request_count: u64,

    /// 步骤涉及的项目
    pub ref_project_ids: BTreeSet<String>,

    /// 需要下载执行文件的资源 ID
    pub file_resource_ids: BTreeSet<String>,

    /// 非引用请求步骤 ID -> 所属场景 ID
    pub file_step_scenario_map: BTreeMap<String, String>,

    /// 唯一 ID -> 步骤 ID
    pub step_ids: BTreeMap<String, String>,
}

/// 编译结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledScenario {
    pub root: ExecutableElement,
    pub meta: CompiledMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_node_from_json() {
        let node: StepNode = serde_json::from_str(
            r#"{"id":"s1","stepType":"API","refType":"REF","resourceId":"api-1","children":[{"id":"s2","stepType":"WHILE_CONTROLLER"}]}"#,
        )
        .unwrap();
        assert_eq!(node.ref_type, RefType::FullRef);
        assert!(node.enabled);
        assert_eq!(node.children[0].step_type, StepType::Unknown);
    }

    #[test]
    fn test_copy_and_ref_api() {
        assert!(is_copy_api(StepType::Api, RefType::PartialRef));
        assert!(!is_copy_api(StepType::ApiScenario, RefType::PartialRef));
        assert!(is_ref_api(StepType::ApiCase, RefType::FullRef));
        assert!(!is_ref_api(StepType::ApiScenario, RefType::FullRef));
    }

    #[test]
    fn test_element_body_tagged() {
        let body = ElementBody::Wait(WaitBody { delay: 500 });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "WAIT");
        assert_eq!(json["delay"], 500);
    }
}
