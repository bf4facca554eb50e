//! 执行节点客户端

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::task::{TaskBatchRequest, TaskRequest};
use crate::{OrchestratorDescriptor, Result, TransportError, WorkerEndpoint};

/// 执行节点 / 编排器的确认响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub code: Option<i64>,

    #[serde(default)]
    pub message: Option<String>,
}

/// 任务投递接口
///
/// 投递只等待节点确认接收，不等待执行完成。
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// 发送单个任务到执行节点
    async fn send(&self, endpoint: &WorkerEndpoint, request: &TaskRequest) -> Result<Ack>;

    /// 发送一批任务到执行节点
    async fn send_batch(&self, endpoint: &WorkerEndpoint, request: &TaskBatchRequest)
        -> Result<Ack>;

    /// 提交单个任务到编排器
    async fn send_orchestrated(
        &self,
        descriptor: &OrchestratorDescriptor,
        request: &TaskRequest,
    ) -> Result<Ack>;

    /// 提交一批任务到编排器
    async fn send_orchestrated_batch(
        &self,
        descriptor: &OrchestratorDescriptor,
        request: &TaskBatchRequest,
    ) -> Result<Ack>;
}

/// 基于 HTTP 的投递实现
pub struct HttpWorkerTransport {
    http_client: Client,
    config: TransportConfig,
}

impl HttpWorkerTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| TransportError::ConfigError(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn worker_url(endpoint: &WorkerEndpoint, path: &str) -> String {
        format!("{}{}", endpoint.base_url(), path)
    }

    fn orchestrator_url(descriptor: &OrchestratorDescriptor, path: &str) -> String {
        format!(
            "{}/namespaces/{}/deployments/{}{}",
            descriptor.api_url.trim_end_matches('/'),
            descriptor.namespace,
            descriptor.deploy_name,
            path
        )
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        token: Option<&str>,
        body: &T,
    ) -> Result<Ack> {
        debug!("投递任务: POST {}", url);

        let mut request = self.http_client.post(url).json(body);
        if let Some(token) = token {
            request = request.header("Token", token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!("任务投递被拒绝: {} - {}", status, text);
            return Err(rejected(status, &text));
        }

        if text.trim().is_empty() {
            return Ok(Ack::default());
        }

        serde_json::from_str::<Ack>(&text).map_err(|e| TransportError::SerdeError(e.to_string()))
    }
}

/// 从错误响应体中提取业务错误码
fn rejected(status: StatusCode, body: &str) -> TransportError {
    let parsed = serde_json::from_str::<Ack>(body).ok();
    let code = parsed.as_ref().and_then(|ack| ack.code);
    let message = parsed
        .and_then(|ack| ack.message)
        .unwrap_or_else(|| body.to_string());

    TransportError::Rejected {
        status: status.as_u16(),
        code,
        message,
    }
}

#[async_trait]
impl WorkerTransport for HttpWorkerTransport {
    async fn send(&self, endpoint: &WorkerEndpoint, request: &TaskRequest) -> Result<Ack> {
        let path = if request.task_info.run_mode.is_debug() {
            "/api/debug"
        } else {
            "/api/run"
        };
        self.post(&Self::worker_url(endpoint, path), None, request)
            .await
    }

    async fn send_batch(
        &self,
        endpoint: &WorkerEndpoint,
        request: &TaskBatchRequest,
    ) -> Result<Ack> {
        self.post(&Self::worker_url(endpoint, "/api/batch/run"), None, request)
            .await
    }

    async fn send_orchestrated(
        &self,
        descriptor: &OrchestratorDescriptor,
        request: &TaskRequest,
    ) -> Result<Ack> {
        let body = serde_json::json!({
            "concurrencyLimit": descriptor.concurrency_limit,
            "podThreads": descriptor.pod_threads,
            "request": request,
        });
        self.post(
            &Self::orchestrator_url(descriptor, "/tasks"),
            descriptor.token.as_deref(),
            &body,
        )
        .await
    }

    async fn send_orchestrated_batch(
        &self,
        descriptor: &OrchestratorDescriptor,
        request: &TaskBatchRequest,
    ) -> Result<Ack> {
        let body = serde_json::json!({
            "concurrencyLimit": descriptor.concurrency_limit,
            "podThreads": descriptor.pod_threads,
            "request": request,
        });
        self.post(
            &Self::orchestrator_url(descriptor, "/tasks/batch"),
            descriptor.token.as_deref(),
            &body,
        )
        .await
    }
}
