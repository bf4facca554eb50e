//! 场景执行
//!
//! 编译步骤树 -> 初始化报告和报告步骤 -> 组装任务请求 -> 分发。

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use apirun_compiler::{
    build_report_steps, CompileContext, CompileError, CompiledScenario, RootScenario,
    ScenarioConfig, StepNode, StepTreeCompiler,
};
use apirun_transport::{ExecutionTask, RunMode, RunModeConfig, TaskInfo, TaskRequest};

use crate::dispatcher::{new_report_id, Dispatcher};
use crate::sink::{ReportSink, ScenarioReport, ScenarioReportStore, TaskErrorKind};
use crate::Result;

/// 运行配置中表示"不指定环境"的取值
pub const NONE_ENVIRONMENT: &str = "NONE";

/// 确定执行环境
///
/// 运行配置指定了环境时优先使用 (含是否环境组)，否则使用场景自身的环境。
pub fn effective_environment(
    run_mode_config: &RunModeConfig,
    own_environment_id: Option<&str>,
    own_grouped: bool,
) -> (Option<String>, bool) {
    match run_mode_config
        .environment_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty() && *id != NONE_ENVIRONMENT)
    {
        Some(id) => (Some(id.to_string()), run_mode_config.grouped),
        None => (own_environment_id.map(str::to_string), own_grouped),
    }
}

/// 场景执行请求
#[derive(Debug, Clone)]
pub struct ScenarioRunRequest {
    pub scenario: RootScenario,
    pub steps: Vec<StepNode>,
    /// 场景自身的环境
    pub environment_id: Option<String>,
    pub grouped: bool,
    /// 调用方提供的步骤详情 (未保存的修改)
    pub step_details: HashMap<String, Value>,
    pub task_info: TaskInfo,
    pub task_item_id: String,
    /// 预先生成的报告 ID，提供时结果实时返回
    pub report_id: Option<String>,
}

impl ScenarioRunRequest {
    pub fn new(scenario: RootScenario, steps: Vec<StepNode>, task_info: TaskInfo, task_item_id: &str) -> Self {
        Self {
            scenario,
            steps,
            environment_id: None,
            grouped: false,
            step_details: HashMap::new(),
            task_info,
            task_item_id: task_item_id.to_string(),
            report_id: None,
        }
    }

    pub fn with_environment(mut self, environment_id: &str, grouped: bool) -> Self {
        self.environment_id = Some(environment_id.to_string());
        self.grouped = grouped;
        self
    }

    pub fn with_report_id(mut self, report_id: &str) -> Self {
        self.report_id = Some(report_id.to_string());
        self
    }

    pub fn with_step_details(mut self, step_details: HashMap<String, Value>) -> Self {
        self.step_details = step_details;
        self
    }

    fn supplied_report_id(&self) -> Option<String> {
        self.report_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// 场景执行器
pub struct ScenarioRunner {
    compiler: StepTreeCompiler,
    dispatcher: Arc<Dispatcher>,
    sink: Arc<dyn ReportSink>,
    reports: Arc<dyn ScenarioReportStore>,
}

impl ScenarioRunner {
    pub fn new(
        compiler: StepTreeCompiler,
        dispatcher: Arc<Dispatcher>,
        sink: Arc<dyn ReportSink>,
        reports: Arc<dyn ScenarioReportStore>,
    ) -> Self {
        Self {
            compiler,
            dispatcher,
            sink,
            reports,
        }
    }

    /// 正式执行
    ///
    /// 同一报告 ID 重复执行时报告只创建一次。
    pub async fn run(&self, mut request: ScenarioRunRequest) -> Result<TaskRequest> {
        let supplied = request.supplied_report_id();
        let real_time = supplied.is_some();
        let report_id = supplied.unwrap_or_else(new_report_id);
        let (environment_id, grouped) = effective_environment(
            &request.task_info.run_mode_config,
            request.environment_id.as_deref(),
            request.grouped,
        );

        let compiled = self
            .compile(&mut request, &report_id, environment_id.clone(), grouped)
            .await?;

        let mut task_info = request.task_info;
        task_info.run_mode = RunMode::Run;
        task_info.save_result = true;
        task_info.real_time = real_time;
        task_info.run_mode_config.environment_id = environment_id.clone();
        task_info.run_mode_config.grouped = grouped;

        let report = ScenarioReport {
            id: report_id.clone(),
            scenario_id: request.scenario.resource_id.clone(),
            project_id: task_info.project_id.clone(),
            name: request.scenario.name.clone(),
            task_item_id: request.task_item_id.clone(),
            environment_id,
            pool_id: task_info.run_mode_config.pool_id.clone(),
            trigger_mode: task_info.trigger_mode.clone(),
            user_id: task_info.user_id.clone(),
            integrated: task_info.run_mode_config.integrated_report,
            waiting_time: ScenarioConfig::from_value(request.scenario.config.as_ref())
                .global_wait_time(),
            status: "PENDING".to_string(),
            created_at: Utc::now(),
        };
        if self.reports.init_report(&report).await? {
            info!("创建场景报告 {}", report_id);
        } else {
            info!("场景报告 {} 已存在，跳过创建", report_id);
        }

        let report_steps = build_report_steps(&report_id, &mut request.steps);
        self.reports.init_report_steps(&report_steps).await?;

        let task_item = task_item(&request.task_item_id, &request.scenario, &report_id, &compiled)?;
        self.dispatcher
            .execute(TaskRequest::new(task_info, task_item))
            .await
    }

    /// 调试执行
    ///
    /// 不保存结果，任务 ID 和任务项 ID 都使用报告 ID。前端调试只返回请求。
    pub async fn debug(&self, mut request: ScenarioRunRequest) -> Result<TaskRequest> {
        let report_id = request.supplied_report_id().unwrap_or_else(new_report_id);
        let (environment_id, grouped) = effective_environment(
            &request.task_info.run_mode_config,
            request.environment_id.as_deref(),
            request.grouped,
        );

        if !request.task_info.run_mode.is_debug() {
            request.task_info.run_mode = RunMode::BackendDebug;
        }
        request.task_item_id = report_id.clone();

        let compiled = self
            .compile(&mut request, &report_id, environment_id.clone(), grouped)
            .await?;

        let mut task_info = request.task_info;
        task_info.task_id = report_id.clone();
        task_info.save_result = false;
        task_info.real_time = true;
        task_info.run_mode_config.environment_id = environment_id;
        task_info.run_mode_config.grouped = grouped;

        let task_item = task_item(&report_id, &request.scenario, &report_id, &compiled)?;
        self.dispatcher
            .execute(TaskRequest::new(task_info, task_item))
            .await
    }

    async fn compile(
        &self,
        request: &mut ScenarioRunRequest,
        report_id: &str,
        environment_id: Option<String>,
        grouped: bool,
    ) -> Result<CompiledScenario> {
        let context = CompileContext {
            environment_id,
            grouped,
            step_details: std::mem::take(&mut request.step_details),
            report_id: Some(report_id.to_string()),
        };

        match self
            .compiler
            .compile(&request.scenario, &mut request.steps, &context)
            .await
        {
            Ok(compiled) => Ok(compiled),
            Err(e @ CompileError::ResourceNotFound { .. }) => {
                warn!("场景 {} 编译失败: {}", request.scenario.resource_id, e);
                if let Err(sink_err) = self
                    .mark_case_not_exist(&request.task_info, &request.task_item_id)
                    .await
                {
                    error!("记录任务项 {} 用例不存在失败: {}", request.task_item_id, sink_err);
                }
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 用例已删除时的处理
    ///
    /// 记录任务项错误，集合报告中同时从执行集合移除。调用方加载场景失败时也应调用。
    pub async fn mark_case_not_exist(&self, task_info: &TaskInfo, task_item_id: &str) -> Result<()> {
        if task_info.run_mode.is_debug() {
            return Ok(());
        }
        self.sink
            .record_task_error(task_item_id, TaskErrorKind::CaseNotExist)
            .await?;
        if task_info.run_mode_config.integrated_report {
            self.reports
                .remove_execution_set_item(&task_info.task_id, task_item_id)
                .await?;
            info!("任务项 {} 的用例已删除，已从执行集合移除", task_item_id);
        }
        Ok(())
    }
}

fn task_item(
    task_item_id: &str,
    scenario: &RootScenario,
    report_id: &str,
    compiled: &CompiledScenario,
) -> Result<ExecutionTask> {
    Ok(ExecutionTask::new(task_item_id, &scenario.resource_id)
        .with_report_id(report_id)
        .with_request_count(compiled.meta.request_count)
        .with_payload(serde_json::to_value(compiled)?))
}
