//! 场景配置

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 场景配置中与分发相关的部分
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    #[serde(default)]
    pub pre_processor_config: Option<ProcessorConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default)]
    pub processors: Option<Vec<Processor>>,
}

/// 前置处理器
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "processorType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Processor {
    /// 等待
    TimeWaiting {
        #[serde(default)]
        enable: bool,
        /// 毫秒
        #[serde(default)]
        delay: Option<u64>,
    },
    #[serde(other)]
    Other,
}

impl ScenarioConfig {
    /// 从场景配置 JSON 解析，无法解析时按空配置处理
    pub fn from_value(value: Option<&Value>) -> Self {
        value
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// 场景前置的总等待时间 (毫秒)
    ///
    /// 累加启用的等待处理器，合计为 0 或未配置处理器时返回 None。
    pub fn global_wait_time(&self) -> Option<u64> {
        let processors = self.pre_processor_config.as_ref()?.processors.as_ref()?;
        let total: u64 = processors
            .iter()
            .map(|processor| match processor {
                Processor::TimeWaiting {
                    enable: true,
                    delay: Some(delay),
                } => *delay,
                _ => 0,
            })
            .sum();
        (total > 0).then_some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_global_wait_time_sums_enabled() {
        let config = ScenarioConfig::from_value(Some(&json!({
            "preProcessorConfig": {
                "processors": [
                    {"processorType": "TIME_WAITING", "enable": true, "delay": 1000},
                    {"processorType": "TIME_WAITING", "enable": false, "delay": 5000},
                    {"processorType": "SCRIPT", "script": "log.info(1)"},
                    {"processorType": "TIME_WAITING", "enable": true, "delay": 500}
                ]
            }
        })));
        assert_eq!(config.global_wait_time(), Some(1500));
    }

    #[test]
    fn test_global_wait_time_none() {
        assert_eq!(ScenarioConfig::from_value(None).global_wait_time(), None);

        let zero = ScenarioConfig::from_value(Some(&json!({
            "preProcessorConfig": {"processors": [
                {"processorType": "TIME_WAITING", "enable": true, "delay": 0}
            ]}
        })));
        assert_eq!(zero.global_wait_time(), None);
    }
}
