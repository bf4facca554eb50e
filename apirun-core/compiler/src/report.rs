//! 报告步骤与请求计数

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::compiler::{step_unique_id, MAX_STEP_DEPTH};
use crate::model::{StepNode, StepType};

/// 报告步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStep {
    pub report_id: String,
    /// 步骤唯一 ID
    pub step_id: String,
    pub parent_id: Option<String>,
    /// 同级内从 1 开始
    pub sort: u64,
    pub name: String,
    pub step_type: StepType,
}

/// 生成报告步骤 (深度优先)
///
/// 缺少唯一 ID 的步骤按报告 ID 推导并写回，与编译时分配的 ID 一致。
pub fn build_report_steps(report_id: &str, steps: &mut [StepNode]) -> Vec<ReportStep> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    collect_report_steps(report_id, None, steps, &mut path, &mut out);
    out
}

fn collect_report_steps(
    report_id: &str,
    parent_id: Option<&str>,
    steps: &mut [StepNode],
    path: &mut Vec<usize>,
    out: &mut Vec<ReportStep>,
) {
    if path.len() >= MAX_STEP_DEPTH {
        warn!("报告步骤层级超过 {}，忽略更深的步骤", MAX_STEP_DEPTH);
        return;
    }

    for (index, step) in steps.iter_mut().enumerate() {
        path.push(index);
        let unique_id = match step.unique_id() {
            Some(id) => id.to_string(),
            None => {
                let id = step_unique_id(Some(report_id), path, &step.id);
                step.unique_id = Some(id.clone());
                id
            }
        };

        out.push(ReportStep {
            report_id: report_id.to_string(),
            step_id: unique_id.clone(),
            parent_id: parent_id.map(str::to_string),
            sort: index as u64 + 1,
            name: step.name.clone(),
            step_type: step.step_type,
        });

        collect_report_steps(report_id, Some(&unique_id), &mut step.children, path, out);
        path.pop();
    }
}

/// 启用的请求类步骤数 (禁用步骤的子树不计入)
///
/// 只看步骤树，不解析步骤内容。判断任务完成应使用编译结果的
/// [`crate::CompiledMeta::request_count`]。
pub fn request_count(steps: &[StepNode]) -> u64 {
    steps
        .iter()
        .filter(|step| step.enabled)
        .map(|step| u64::from(step.step_type.is_request()) + request_count(&step.children))
        .sum()
}
