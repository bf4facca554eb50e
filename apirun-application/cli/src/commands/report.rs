//! 执行结果查询命令

use anyhow::Result;
use chrono::Local;
use colored::Colorize;

use apirun_dispatcher::TaskErrorKind;

use super::common::load_context;

pub async fn handle(action: crate::ReportAction) -> Result<()> {
    match action {
        crate::ReportAction::Show { id } => show_report(&id).await,
        crate::ReportAction::Errors => list_errors().await,
    }
}

async fn show_report(id: &str) -> Result<()> {
    let (_, storage) = load_context().await?;

    let Some(report) = storage.reports().get(id).await? else {
        println!("\n{} 未找到报告 ID: {}", "✗".red(), id);
        return Ok(());
    };
    let steps = storage.reports().list_steps(id).await?;

    println!("\n{} 场景报告详情\n", "📊".cyan());
    println!("  ID: {}", report.id);
    println!("  场景: {} ({})", report.name.bold(), report.scenario_id);
    println!("  项目: {}", report.project_id);
    println!("  任务项: {}", report.task_item_id);
    println!("  状态: {}", report.status.yellow());
    println!(
        "  环境: {}",
        report.environment_id.as_deref().unwrap_or("-")
    );
    println!("  资源池: {}", report.pool_id.as_deref().unwrap_or("-"));
    if let Some(waiting_time) = report.waiting_time {
        println!("  等待时间: {}ms", waiting_time);
    }
    println!(
        "  创建时间: {}",
        report
            .created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );

    if steps.is_empty() {
        return Ok(());
    }

    println!("\n  步骤 ({}):", steps.len());
    println!(
        "  {:<38} {:<38} {:<6} {:<20} {}",
        "步骤 ID".bold(),
        "父步骤".bold(),
        "序号".bold(),
        "类型".bold(),
        "名称".bold()
    );
    for step in steps {
        println!(
            "  {:<38} {:<38} {:<6} {:<20} {}",
            step.step_id,
            step.parent_id.as_deref().unwrap_or("-"),
            step.sort,
            step.step_type,
            step.name
        );
    }

    Ok(())
}

async fn list_errors() -> Result<()> {
    let (_, storage) = load_context().await?;
    let items = storage.task_items().list_errors().await?;

    if items.is_empty() {
        println!("{} 没有错误标记的任务项", "ℹ".yellow());
        return Ok(());
    }

    println!("{} 找到 {} 个错误标记:\n", "✓".green(), items.len());
    for item in items {
        let message = item.error_message.as_deref().unwrap_or_default();
        let label = match TaskErrorKind::parse(message) {
            Some(TaskErrorKind::InvalidResourcePool) => "资源池无效".red(),
            Some(TaskErrorKind::CaseNotExist) => "用例不存在".red(),
            None => message.normal(),
        };
        println!(
            "  {:<38} {:<24} {}",
            item.id,
            message,
            label
        );
    }

    Ok(())
}
