//! 步骤树编译
//!
//! 编译流程:
//! 1. 跳过禁用步骤及其子树
//! 2. 查询步骤详情，应用部分引用场景的启用配置
//! 3. 按资源种类批量查询被引用资源
//! 4. 批量加载根场景和被引用场景的环境
//! 5. 深度优先解析步骤，分配唯一 ID，维护元数据
//! 6. 整棵树构建完成后批量补全接口模块信息

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::decode::decode_step;
use crate::environment::{EnvironmentIndex, EnvironmentMode};
use crate::model::{
    is_copy_api, CompiledMeta, CompiledScenario, ElementBody, ExecutableElement, RefType,
    RootScenario, ScenarioBody, StepNode, StepType,
};
use crate::source::{
    BlobStore, DefinitionCatalog, DefinitionExecuteInfo, EnvironmentService, ResourceKind,
    ScenarioBlob,
};
use crate::{CompileError, Result};

/// 步骤树最大深度
pub const MAX_STEP_DEPTH: usize = 64;

/// 编译参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileContext {
    /// 根场景的环境 ID 或环境组 ID
    #[serde(default)]
    pub environment_id: Option<String>,

    #[serde(default)]
    pub grouped: bool,

    /// 调用方直接提供的步骤详情，优先于已保存的详情
    #[serde(default)]
    pub step_details: HashMap<String, Value>,

    /// 报告 ID，已知时唯一 ID 由报告 ID 推导
    #[serde(default)]
    pub report_id: Option<String>,
}

impl CompileContext {
    pub fn environment_mode(&self) -> Option<EnvironmentMode> {
        EnvironmentMode::new(self.environment_id.as_deref(), self.grouped)
    }
}

/// 生成步骤唯一 ID
///
/// 已知报告 ID 时由 (报告 ID, 树中位置, 步骤 ID) 推导，同一报告重复编译得到相同的 ID。
pub fn step_unique_id(report_id: Option<&str>, path: &[usize], step_id: &str) -> String {
    match report_id.filter(|id| !id.trim().is_empty()) {
        Some(report_id) => {
            let position: Vec<String> = path.iter().map(usize::to_string).collect();
            let name = format!("{}/{}/{}", report_id, position.join("."), step_id);
            Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
        }
        None => Uuid::new_v4().to_string(),
    }
}

/// 步骤树编译器
pub struct StepTreeCompiler {
    blobs: Arc<dyn BlobStore>,
    environments: Arc<dyn EnvironmentService>,
    catalog: Arc<dyn DefinitionCatalog>,
}

impl StepTreeCompiler {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        environments: Arc<dyn EnvironmentService>,
        catalog: Arc<dyn DefinitionCatalog>,
    ) -> Self {
        Self {
            blobs,
            environments,
            catalog,
        }
    }

    /// 编译场景步骤树
    ///
    /// 分配的唯一 ID 和部分引用的启用配置会写回 `steps`。
    pub async fn compile(
        &self,
        root: &RootScenario,
        steps: &mut [StepNode],
        context: &CompileContext,
    ) -> Result<CompiledScenario> {
        check_depth(steps, 1)?;
        info!("编译场景 {}，顶层步骤 {} 个", root.resource_id, steps.len());

        let step_details = self.load_step_details(steps, context).await?;
        let resources = self.load_resources(steps).await?;
        let scenario_blobs = parse_scenario_blobs(&resources);

        let root_mode = context.environment_mode();
        let modes: Vec<EnvironmentMode> = root_mode
            .iter()
            .cloned()
            .chain(
                scenario_blobs
                    .values()
                    .filter_map(EnvironmentMode::from_scenario_blob),
            )
            .collect();
        let environments = EnvironmentIndex::load(self.environments.as_ref(), modes).await?;

        let mut walker = TreeWalker {
            step_details: &step_details,
            resources: &resources,
            scenario_blobs: &scenario_blobs,
            environments: &environments,
            report_id: context.report_id.as_deref(),
            meta: CompiledMeta::default(),
        };
        let mut path = Vec::new();
        let children = walker.compile_steps(steps, &root.resource_id, &mut path)?;
        let meta = walker.meta;

        let mut root_element = ExecutableElement {
            step_id: root.resource_id.clone(),
            resource_id: Some(root.resource_id.clone()),
            project_id: root.project_id.clone(),
            name: root.name.clone(),
            step_type: StepType::ApiScenario,
            ref_type: RefType::Direct,
            body: ElementBody::Scenario(ScenarioBody {
                environment: root_mode.as_ref().and_then(|mode| environments.binding(mode)),
                step_config: None,
                config: root.config.clone(),
            }),
            children,
        };

        self.resolve_http_info(&mut root_element).await?;

        info!(
            "场景 {} 编译完成，元素 {} 个，请求 {} 个",
            root.resource_id,
            root_element.len(),
            meta.request_count
        );
        Ok(CompiledScenario {
            root: root_element,
            meta,
        })
    }

    /// 查询步骤详情
    ///
    /// 先查询部分引用场景的启用配置并应用，再查询其余启用步骤的详情。
    async fn load_step_details(
        &self,
        steps: &mut [StepNode],
        context: &CompileContext,
    ) -> Result<HashMap<String, String>> {
        let mut details: HashMap<String, String> = context
            .step_details
            .iter()
            .map(|(id, detail)| (id.clone(), detail_to_string(detail)))
            .collect();
        let mut requested = HashSet::new();

        let mut ids = Vec::new();
        collect_detail_ids(steps, &details, true, &mut ids);
        self.fetch_step_details(ids, &mut details, &mut requested)
            .await?;
        apply_partial_ref_enable(steps, &details);

        let mut ids = Vec::new();
        collect_detail_ids(steps, &details, false, &mut ids);
        ids.retain(|id| !requested.contains(id));
        self.fetch_step_details(ids, &mut details, &mut requested)
            .await?;

        Ok(details)
    }

    async fn fetch_step_details(
        &self,
        ids: Vec<String>,
        details: &mut HashMap<String, String>,
        requested: &mut HashSet<String>,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        debug!("查询步骤详情 {} 个", ids.len());
        for blob in self.blobs.get_blobs(ResourceKind::Step, &ids).await? {
            details.insert(blob.id, blob.content);
        }
        requested.extend(ids);
        Ok(())
    }

    /// 按资源种类批量查询被引用资源
    async fn load_resources(
        &self,
        steps: &[StepNode],
    ) -> Result<HashMap<(ResourceKind, String), String>> {
        let mut refs: HashMap<ResourceKind, Vec<String>> = HashMap::new();
        collect_ref_ids(steps, &mut refs);

        let mut resources = HashMap::new();
        for kind in [
            ResourceKind::Definition,
            ResourceKind::Case,
            ResourceKind::Scenario,
        ] {
            let Some(ids) = refs.get(&kind) else {
                continue;
            };
            debug!("查询被引用的{} {} 个", kind, ids.len());
            for blob in self.blobs.get_blobs(kind, ids).await? {
                resources.insert((kind, blob.id), blob.content);
            }
        }
        Ok(resources)
    }

    /// 批量补全接口/用例请求的模块信息
    ///
    /// 复制的接口保留自身的请求方法和路径。
    async fn resolve_http_info(&self, root: &mut ExecutableElement) -> Result<()> {
        let mut ids: HashMap<ResourceKind, Vec<String>> = HashMap::new();
        root.walk(&mut |element| {
            if !matches!(element.body, ElementBody::Http(_)) {
                return;
            }
            if let (Some(kind), Some(resource_id)) =
                (http_info_kind(element.step_type), element.resource_id.as_ref())
            {
                let entry = ids.entry(kind).or_default();
                if !entry.contains(resource_id) {
                    entry.push(resource_id.clone());
                }
            }
        });

        let mut infos: HashMap<(ResourceKind, String), DefinitionExecuteInfo> = HashMap::new();
        for kind in [ResourceKind::Definition, ResourceKind::Case] {
            let Some(ids) = ids.get(&kind) else {
                continue;
            };
            for info in self.catalog.get_execute_info(kind, ids).await? {
                infos.insert((kind, info.resource_id.clone()), info);
            }
        }

        if infos.is_empty() {
            return Ok(());
        }

        root.walk_mut(&mut |element| {
            let copied = is_copy_api(element.step_type, element.ref_type);
            let Some(kind) = http_info_kind(element.step_type) else {
                return;
            };
            let Some(resource_id) = element.resource_id.clone() else {
                return;
            };
            let ElementBody::Http(http) = &mut element.body else {
                return;
            };
            let Some(info) = infos.get(&(kind, resource_id)) else {
                return;
            };

            http.module_id = info.module_id.clone();
            if !copied {
                if let Some(method) = &info.method {
                    http.method = method.clone();
                }
                if let Some(path) = &info.path {
                    http.path = path.clone();
                }
            }
        });
        Ok(())
    }
}

fn http_info_kind(step_type: StepType) -> Option<ResourceKind> {
    match step_type {
        StepType::Api => Some(ResourceKind::Definition),
        StepType::ApiCase => Some(ResourceKind::Case),
        _ => None,
    }
}

fn detail_to_string(detail: &Value) -> String {
    match detail {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_partial_ref_scenario(step: &StepNode) -> bool {
    step.step_type.is_scenario() && step.ref_type == RefType::PartialRef
}

fn check_depth(steps: &[StepNode], depth: usize) -> Result<()> {
    if steps.is_empty() {
        return Ok(());
    }
    if depth > MAX_STEP_DEPTH {
        return Err(CompileError::TooDeep(MAX_STEP_DEPTH));
    }
    for step in steps {
        check_depth(&step.children, depth + 1)?;
    }
    Ok(())
}

/// 收集需要查询详情的启用步骤
///
/// 完全引用的步骤内容取自被引用资源，不查询详情。
fn collect_detail_ids(
    steps: &[StepNode],
    details: &HashMap<String, String>,
    partial_ref_only: bool,
    out: &mut Vec<String>,
) {
    for step in steps.iter().filter(|step| step.enabled) {
        let wanted = if partial_ref_only {
            is_partial_ref_scenario(step)
        } else {
            step.ref_type != RefType::FullRef
        };
        if wanted && !details.contains_key(&step.id) && !out.contains(&step.id) {
            out.push(step.id.clone());
        }
        collect_detail_ids(&step.children, details, partial_ref_only, out);
    }
}

/// 应用部分引用场景的启用配置 (`{"子步骤 ID": 是否启用}`)
fn apply_partial_ref_enable(steps: &mut [StepNode], details: &HashMap<String, String>) {
    for step in steps.iter_mut().filter(|step| step.enabled) {
        if is_partial_ref_scenario(step) {
            let enable_map = details
                .get(&step.id)
                .and_then(|detail| serde_json::from_str::<Map<String, Value>>(detail).ok());
            if let Some(enable_map) = enable_map {
                set_enable(&mut step.children, &enable_map);
            }
        }
        apply_partial_ref_enable(&mut step.children, details);
    }
}

fn set_enable(steps: &mut [StepNode], enable_map: &Map<String, Value>) {
    for step in steps.iter_mut() {
        if let Some(enabled) = enable_map.get(&step.id).and_then(Value::as_bool) {
            step.enabled = enabled;
        }
        set_enable(&mut step.children, enable_map);
    }
}

/// 按资源种类收集启用的引用步骤的资源 ID
fn collect_ref_ids(steps: &[StepNode], refs: &mut HashMap<ResourceKind, Vec<String>>) {
    for step in steps.iter().filter(|step| step.enabled) {
        if step.ref_type.is_ref_or_partial_ref() {
            if let (Some(kind), Some(resource_id)) =
                (step.step_type.resource_kind(), step.resource_id())
            {
                let ids = refs.entry(kind).or_default();
                if !ids.iter().any(|id| id == resource_id) {
                    ids.push(resource_id.to_string());
                }
            }
        }
        collect_ref_ids(&step.children, refs);
    }
}

fn parse_scenario_blobs(
    resources: &HashMap<(ResourceKind, String), String>,
) -> HashMap<String, ScenarioBlob> {
    resources
        .iter()
        .filter(|((kind, _), _)| *kind == ResourceKind::Scenario)
        .filter_map(|((_, id), content)| {
            serde_json::from_str::<ScenarioBlob>(content)
                .ok()
                .map(|blob| (id.clone(), blob))
        })
        .collect()
}

/// 深度优先构建可执行树
struct TreeWalker<'a> {
    step_details: &'a HashMap<String, String>,
    resources: &'a HashMap<(ResourceKind, String), String>,
    scenario_blobs: &'a HashMap<String, ScenarioBlob>,
    environments: &'a EnvironmentIndex,
    report_id: Option<&'a str>,
    meta: CompiledMeta,
}

impl<'a> TreeWalker<'a> {
    fn compile_steps(
        &mut self,
        steps: &mut [StepNode],
        scenario_id: &str,
        path: &mut Vec<usize>,
    ) -> Result<Vec<ExecutableElement>> {
        let mut elements = Vec::new();
        for (index, step) in steps.iter_mut().enumerate() {
            path.push(index);
            let element = self.compile_step(step, scenario_id, path);
            path.pop();
            if let Some(element) = element? {
                elements.push(element);
            }
        }
        Ok(elements)
    }

    fn compile_step(
        &mut self,
        step: &mut StepNode,
        scenario_id: &str,
        path: &mut Vec<usize>,
    ) -> Result<Option<ExecutableElement>> {
        if !step.enabled {
            return Ok(None);
        }

        let unique_id = match step.unique_id() {
            Some(id) => id.to_string(),
            None => {
                let id = step_unique_id(self.report_id, path, &step.id);
                step.unique_id = Some(id.clone());
                id
            }
        };

        let content = self.content_for(step)?;
        let Some(mut body) = decode_step(step, content) else {
            return Ok(None);
        };

        self.record_meta(step, &unique_id, &body, scenario_id);

        let is_scenario_ref = step.step_type.is_scenario() && step.ref_type.is_ref_or_partial_ref();
        if is_scenario_ref {
            if let ElementBody::Scenario(scenario) = &mut body {
                scenario.environment = step
                    .resource_id()
                    .and_then(|id| self.scenario_blobs.get(id))
                    .and_then(EnvironmentMode::from_scenario_blob)
                    .and_then(|mode| self.environments.binding(&mode));
            }
        }

        let child_scenario_id = if is_scenario_ref {
            step.resource_id().unwrap_or(scenario_id).to_string()
        } else {
            scenario_id.to_string()
        };
        let children = self.compile_steps(&mut step.children, &child_scenario_id, path)?;

        Ok(Some(ExecutableElement {
            step_id: unique_id,
            resource_id: step.resource_id.clone(),
            project_id: step.project_id.clone(),
            name: step.name.clone(),
            step_type: step.step_type,
            ref_type: step.ref_type,
            body,
            children,
        }))
    }

    /// 步骤内容
    ///
    /// 引用步骤取被引用资源，资源不存在时返回 [`CompileError::ResourceNotFound`]；
    /// 复制的接口优先使用自身详情。
    fn content_for(&self, step: &StepNode) -> Result<Option<&'a str>> {
        let details: &'a HashMap<String, String> = self.step_details;
        let resources: &'a HashMap<(ResourceKind, String), String> = self.resources;
        let own_detail = details.get(&step.id).map(String::as_str);
        let kind = step.step_type.resource_kind();

        if step.ref_type == RefType::Direct {
            return Ok(own_detail);
        }

        if is_copy_api(step.step_type, step.ref_type) {
            let source = match (kind, step.resource_id()) {
                (Some(kind), Some(id)) => resources.get(&(kind, id.to_string())),
                _ => None,
            };
            return Ok(own_detail.or(source.map(String::as_str)));
        }

        let Some(kind) = kind else {
            return Ok(own_detail);
        };
        let resource_id = step
            .resource_id()
            .ok_or_else(|| CompileError::ResourceNotFound {
                kind,
                id: step.id.clone(),
            })?;
        resources
            .get(&(kind, resource_id.to_string()))
            .map(|content| Some(content.as_str()))
            .ok_or_else(|| CompileError::ResourceNotFound {
                kind,
                id: resource_id.to_string(),
            })
    }

    fn record_meta(
        &mut self,
        step: &StepNode,
        unique_id: &str,
        body: &ElementBody,
        scenario_id: &str,
    ) {
        let meta = &mut self.meta;
        meta.step_ids.insert(unique_id.to_string(), step.id.clone());

        if step.step_type.is_request() {
            meta.request_count += 1;
        }

        if let Some(project_id) = step.project_id.as_deref().filter(|id| !id.is_empty()) {
            meta.ref_project_ids.insert(project_id.to_string());
        }

        // 引用步骤使用被引用资源的文件，其余请求步骤按自身步骤 ID 解析文件
        let uses_resource_files = step.ref_type == RefType::FullRef
            || (step.ref_type == RefType::PartialRef && !is_copy_api(step.step_type, step.ref_type));
        if uses_resource_files {
            if let Some(resource_id) = step.resource_id() {
                meta.file_resource_ids.insert(resource_id.to_string());
            }
        } else if matches!(body, ElementBody::Http(_)) {
            meta.file_resource_ids.insert(step.id.clone());
            meta.file_step_scenario_map
                .insert(step.id.clone(), scenario_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_derived_from_report() {
        let a = step_unique_id(Some("report-1"), &[0, 2], "step-a");
        let b = step_unique_id(Some("report-1"), &[0, 2], "step-a");
        let c = step_unique_id(Some("report-2"), &[0, 2], "step-a");
        let d = step_unique_id(Some("report-1"), &[1, 2], "step-a");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_unique_id_random_without_report() {
        assert_ne!(
            step_unique_id(None, &[0], "s"),
            step_unique_id(Some(" "), &[0], "s")
        );
    }

    #[test]
    fn test_check_depth() {
        let mut node = StepNode::new("leaf", StepType::Script);
        for i in 0..MAX_STEP_DEPTH {
            node = StepNode::new(&format!("n{}", i), StepType::IfController).with_children(vec![node]);
        }
        assert_eq!(
            check_depth(&[node], 1).unwrap_err(),
            CompileError::TooDeep(MAX_STEP_DEPTH)
        );
    }

    #[test]
    fn test_partial_ref_enable_map() {
        let mut steps = vec![StepNode::new("ref", StepType::ApiScenario)
            .with_ref(RefType::PartialRef, "scenario-b")
            .with_children(vec![
                StepNode::new("c1", StepType::Script),
                StepNode::new("c2", StepType::Script).disabled(),
            ])];
        let mut details = HashMap::new();
        details.insert("ref".to_string(), r#"{"c1":false,"c2":true}"#.to_string());

        apply_partial_ref_enable(&mut steps, &details);
        assert!(!steps[0].children[0].enabled);
        assert!(steps[0].children[1].enabled);
    }

    #[test]
    fn test_collect_ref_ids_skips_disabled_subtree() {
        let steps = vec![
            StepNode::new("g", StepType::IfController)
                .disabled()
                .with_children(vec![StepNode::new("a", StepType::Api).with_ref(RefType::FullRef, "api-1")]),
            StepNode::new("b", StepType::ApiCase).with_ref(RefType::FullRef, "case-1"),
            StepNode::new("c", StepType::ApiCase).with_ref(RefType::FullRef, "case-1"),
        ];
        let mut refs = HashMap::new();
        collect_ref_ids(&steps, &mut refs);
        assert!(!refs.contains_key(&ResourceKind::Definition));
        assert_eq!(refs[&ResourceKind::Case], vec!["case-1".to_string()]);
    }
}
