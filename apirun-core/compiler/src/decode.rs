//! 步骤内容解析
//!
//! 每种步骤类型一个分支。内容缺失或无法解析时跳过该步骤，不影响其余步骤。

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::model::{
    ControllerBody, ElementBody, HttpRequest, ScenarioBody, ScriptBody, StepNode, StepType,
    WaitBody,
};
use crate::source::ScenarioBlob;

/// 把步骤内容解析为元素内容，返回 None 表示跳过
pub fn decode_step(step: &StepNode, content: Option<&str>) -> Option<ElementBody> {
    match step.step_type {
        StepType::Api | StepType::ApiCase | StepType::CustomRequest => {
            parse::<HttpRequest>(step, content).map(ElementBody::Http)
        }
        StepType::Script => parse::<ScriptBody>(step, content).map(ElementBody::Script),
        StepType::IfController | StepType::LoopController | StepType::OnceOnlyController => {
            match content {
                None => Some(ElementBody::Controller(ControllerBody::default())),
                Some(_) => parse::<ControllerBody>(step, content).map(ElementBody::Controller),
            }
        }
        StepType::ConstantTimer => parse::<WaitBody>(step, content).map(ElementBody::Wait),
        StepType::ApiScenario => {
            let blob = match content {
                None => ScenarioBlob::default(),
                Some(_) => parse::<ScenarioBlob>(step, content)?,
            };
            Some(ElementBody::Scenario(ScenarioBody {
                environment: None,
                step_config: step.config.clone(),
                config: blob.config,
            }))
        }
        StepType::Unknown => {
            warn!("跳过未知类型的步骤: {}", step.id);
            None
        }
    }
}

fn parse<T: DeserializeOwned>(step: &StepNode, content: Option<&str>) -> Option<T> {
    let Some(content) = content else {
        warn!("步骤 {} ({}) 缺少内容，跳过", step.id, step.step_type.as_str());
        return None;
    };

    match serde_json::from_str::<T>(content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                "步骤 {} ({}) 内容解析失败，跳过: {}",
                step.id,
                step.step_type.as_str(),
                e
            );
            None
        }
    }
}
