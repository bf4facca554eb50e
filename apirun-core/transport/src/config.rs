//! 传输层配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 传输层配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// 连接超时（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// 等待节点确认的超时（秒）
    ///
    /// 超时属于正常结果，按投递成功处理。
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// 是否校验编排器证书
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            verify_ssl: default_verify_ssl(),
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

// 默认值函数
fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    15
}

fn default_verify_ssl() -> bool {
    true
}
