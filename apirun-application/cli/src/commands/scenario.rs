//! 场景编译和分发命令

use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use apirun_compiler::{CompiledScenario, ElementBody, ExecutableElement};
use apirun_dispatcher::{Dispatcher, ScenarioRunRequest, ScenarioRunner};
use apirun_pool::NodeSelector;
use apirun_transport::{HttpWorkerTransport, RunMode, TaskInfo, TaskRequest};

use super::common::open_storage;
use super::output::output_value;
use crate::bundle::ScenarioBundle;
use crate::config::CliConfig;

/// 分发选项
pub struct RunOptions {
    pub project: Option<String>,
    pub pool: Option<String>,
    pub report_id: Option<String>,
    pub env: Option<String>,
    pub grouped: bool,
    pub debug: bool,
    pub frontend: bool,
}

/// 编译场景包并输出可执行树
pub async fn compile(path: &str, report_id: Option<String>, format: &str) -> Result<()> {
    let mut bundle = ScenarioBundle::load(path)?;
    let compiler = bundle.compiler();
    let context = bundle.context(report_id);

    let compiled = compiler
        .compile(&bundle.scenario, &mut bundle.steps, &context)
        .await
        .context("场景编译失败")?;

    print_summary(&compiled);
    output_value(&compiled, format)
}

/// 编译场景包并分发到资源池
pub async fn run(path: &str, options: RunOptions) -> Result<()> {
    let config = CliConfig::load()?;
    let bundle = ScenarioBundle::load(path)?;

    let project_id = options
        .project
        .clone()
        .or_else(|| bundle.project_id().map(str::to_string))
        .or_else(|| config.default_project.clone())
        .context("未指定项目，请使用 --project 或在配置文件中设置 default_project")?;

    let storage = open_storage(&config).await?;
    let transport = HttpWorkerTransport::new(config.transport.clone())?;
    let dispatcher = Dispatcher::new(
        storage.clone(),
        Arc::new(NodeSelector::new(config.selector.clone())),
        Arc::new(transport),
        storage.clone(),
    )
    .with_config(config.dispatch.clone());
    let runner = ScenarioRunner::new(
        bundle.compiler(),
        Arc::new(dispatcher),
        storage.clone(),
        storage.clone(),
    );

    let task_info = task_info(&config, &project_id, &options);
    let request = run_request(bundle, task_info, &options);

    info!("分发场景 {} (项目 {})", request.scenario.resource_id, project_id);
    let dispatched = if options.debug || options.frontend {
        runner.debug(request).await?
    } else {
        runner.run(request).await?
    };

    print_dispatched(&dispatched, options.frontend)
}

fn task_info(config: &CliConfig, project_id: &str, options: &RunOptions) -> TaskInfo {
    let run_mode = if options.frontend {
        RunMode::FrontendDebug
    } else if options.debug {
        RunMode::BackendDebug
    } else {
        RunMode::Run
    };

    let mut task_info = TaskInfo::new(&Uuid::new_v4().simple().to_string(), project_id)
        .with_run_mode(run_mode);
    task_info.run_mode_config.pool_id = options.pool.clone();
    task_info.ms_url = config.ms_url.clone();
    task_info.trigger_mode = Some("MANUAL".to_string());
    task_info
}

fn run_request(
    bundle: ScenarioBundle,
    task_info: TaskInfo,
    options: &RunOptions,
) -> ScenarioRunRequest {
    let item_id = Uuid::new_v4().simple().to_string();
    let mut request = ScenarioRunRequest::new(bundle.scenario, bundle.steps, task_info, &item_id)
        .with_step_details(bundle.step_details);

    if let Some(environment_id) = &bundle.environment_id {
        request = request.with_environment(environment_id, bundle.grouped);
    }
    // 命令行指定的环境作为运行配置覆盖场景环境
    if let Some(environment_id) = &options.env {
        request.task_info.run_mode_config.environment_id = Some(environment_id.clone());
        request.task_info.run_mode_config.grouped = options.grouped;
    }
    if let Some(report_id) = &options.report_id {
        request = request.with_report_id(report_id);
    }
    request
}

fn print_summary(compiled: &CompiledScenario) {
    let mut requests = 0;
    let mut controllers = 0;
    let mut scenarios = 0;
    compiled.root.walk(&mut |element: &ExecutableElement| match element.body {
        ElementBody::Http(_) => requests += 1,
        ElementBody::Controller(_) => controllers += 1,
        ElementBody::Scenario(_) => scenarios += 1,
        _ => {}
    });

    eprintln!(
        "{} 场景 {} 编译完成: 元素 {} 个，请求 {} 个，控制器 {} 个，场景 {} 个",
        "✓".green(),
        compiled.root.name.bold(),
        compiled.root.len(),
        requests,
        controllers,
        scenarios
    );
    eprintln!("  计数请求: {}", compiled.meta.request_count);
    if !compiled.meta.ref_project_ids.is_empty() {
        let projects: Vec<&str> = compiled.meta.ref_project_ids.iter().map(String::as_str).collect();
        eprintln!("  涉及项目: {}", projects.join(", "));
    }
    if !compiled.meta.file_resource_ids.is_empty() {
        eprintln!("  执行文件资源: {} 个", compiled.meta.file_resource_ids.len());
    }
}

fn print_dispatched(request: &TaskRequest, frontend: bool) -> Result<()> {
    if frontend {
        println!("{} 前端调试，执行请求:", "ℹ".yellow());
        return output_value(request, "json");
    }

    let info = &request.task_info;
    let item = &request.task_item;
    println!("{} 任务已分发", "✓".green());
    println!("  任务 ID: {}", info.task_id);
    println!("  任务项 ID: {}", item.id);
    println!("  报告 ID: {}", item.report_id.as_deref().unwrap_or("-"));
    println!("  资源池: {}", info.pool_id.as_deref().unwrap_or("-"));
    match item.pool_binding.as_ref().and_then(|b| b.worker.as_deref()) {
        Some(worker) => println!("  执行节点: {}", worker),
        None => println!("  执行节点: {}", "未确认 (超时或编排器)".dimmed()),
    }
    println!("  请求数: {}", item.request_count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apirun_compiler::RootScenario;

    fn options() -> RunOptions {
        RunOptions {
            project: None,
            pool: Some("p1".to_string()),
            report_id: None,
            env: None,
            grouped: false,
            debug: false,
            frontend: false,
        }
    }

    fn bundle() -> ScenarioBundle {
        serde_json::from_value(serde_json::json!({
            "scenario": {"resourceId": "scenario-1", "projectId": "proj"},
            "environmentId": "env-1"
        }))
        .unwrap()
    }

    #[test]
    fn test_task_info_modes() {
        let config = CliConfig {
            ms_url: Some("http://platform".to_string()),
            ..CliConfig::default()
        };

        let info = task_info(&config, "proj", &options());
        assert_eq!(info.run_mode, RunMode::Run);
        assert_eq!(info.run_mode_config.pool_id.as_deref(), Some("p1"));
        assert_eq!(info.ms_url.as_deref(), Some("http://platform"));
        assert_eq!(info.trigger_mode.as_deref(), Some("MANUAL"));

        let debug = RunOptions {
            debug: true,
            ..options()
        };
        assert_eq!(task_info(&config, "proj", &debug).run_mode, RunMode::BackendDebug);

        let frontend = RunOptions {
            frontend: true,
            ..options()
        };
        assert_eq!(
            task_info(&config, "proj", &frontend).run_mode,
            RunMode::FrontendDebug
        );
    }

    #[test]
    fn test_run_request_environment_override() {
        let opts = RunOptions {
            env: Some("group-1".to_string()),
            grouped: true,
            report_id: Some("r1".to_string()),
            ..options()
        };
        let info = TaskInfo::new("task", "proj");

        let request = run_request(bundle(), info, &opts);
        assert_eq!(request.environment_id.as_deref(), Some("env-1"));
        assert_eq!(
            request.task_info.run_mode_config.environment_id.as_deref(),
            Some("group-1")
        );
        assert!(request.task_info.run_mode_config.grouped);
        assert_eq!(request.report_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_run_request_keeps_scenario() {
        let request = run_request(bundle(), TaskInfo::new("task", "proj"), &options());
        let expected = RootScenario {
            resource_id: "scenario-1".to_string(),
            project_id: Some("proj".to_string()),
            name: String::new(),
            config: None,
        };
        assert_eq!(request.scenario, expected);
        assert!(request.report_id.is_none());
    }
}
