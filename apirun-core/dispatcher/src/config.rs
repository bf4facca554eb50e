//! 分发配置

use serde::{Deserialize, Serialize};

/// 分发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// 节点未配置单任务并发时使用的默认值
    #[serde(default = "default_per_task_concurrency")]
    pub default_per_task_concurrency: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_per_task_concurrency: default_per_task_concurrency(),
        }
    }
}

fn default_per_task_concurrency() -> u32 {
    3
}
