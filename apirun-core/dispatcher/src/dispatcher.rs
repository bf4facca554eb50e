//! 任务分发器

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use apirun_pool::{
    shard_tasks, NodeSelector, PoolRegistry, PoolResolver, ResourcePool, SelectionStrategy,
    WorkerNode,
};
use apirun_transport::{
    PoolBinding, TaskBatchRequest, TaskInfo, TaskRequest, TransportError, WorkerTransport,
};

use crate::config::DispatchConfig;
use crate::sink::{ReportSink, TaskErrorKind};
use crate::{DispatchError, Result};

/// 分片的分发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardStatus {
    /// 节点已确认
    Placed { worker: String },
    /// 已提交但未获得确认 (确认超时或编排资源池)
    Submitted,
    /// 所有节点都失败
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardOutcome {
    pub task_ids: Vec<String>,
    pub status: ShardStatus,
}

/// 批量分发结果
#[derive(Debug, Clone)]
pub struct BatchDispatch {
    /// 补全报告 ID 和资源池绑定后的请求
    pub request: TaskBatchRequest,
    pub shards: Vec<ShardOutcome>,
}

impl BatchDispatch {
    pub fn failed_task_ids(&self) -> Vec<String> {
        self.shards
            .iter()
            .filter(|shard| shard.status == ShardStatus::Failed)
            .flat_map(|shard| shard.task_ids.iter().cloned())
            .collect()
    }
}

/// 任务分发器
///
/// 各次调用之间只共享节点选择器中的轮询游标，失效节点集合仅在单次调用内有效。
pub struct Dispatcher {
    resolver: PoolResolver,
    selector: Arc<NodeSelector>,
    transport: Arc<dyn WorkerTransport>,
    sink: Arc<dyn ReportSink>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn PoolRegistry>,
        selector: Arc<NodeSelector>,
        transport: Arc<dyn WorkerTransport>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            resolver: PoolResolver::new(registry),
            selector,
            transport,
            sink,
            config: DispatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn selector(&self) -> &NodeSelector {
        &self.selector
    }

    /// 分发单个任务
    ///
    /// 返回补全了资源池、回调地址和报告 ID 的请求。前端调试不分发，直接返回。
    pub async fn execute(&self, mut request: TaskRequest) -> Result<TaskRequest> {
        if request.task_info.run_mode.is_frontend_debug() {
            ensure_report_id(&mut request);
            return Ok(request);
        }

        let debug_mode = request.task_info.run_mode.is_debug();
        let pool = match self.resolve_pool(&request.task_info).await {
            Ok(pool) => pool,
            Err(e) => {
                if matches!(e, DispatchError::PoolNotConfigured) && !debug_mode {
                    self.mark_errors(
                        &[request.task_item.id.clone()],
                        TaskErrorKind::InvalidResourcePool,
                    )
                    .await;
                }
                return Err(e);
            }
        };

        bind_pool(&mut request.task_info, &pool);
        ensure_report_id(&mut request);

        if pool.is_orchestrated() {
            self.orchestrated_execute(&pool, &mut request).await?;
        } else {
            self.node_execute(&pool, &mut request).await?;
        }
        Ok(request)
    }

    /// 测试计划执行
    ///
    /// 资源池未配置时返回 [`DispatchError::InvalidResourcePool`]。
    pub async fn execute_plan_resource(&self, request: TaskRequest) -> Result<TaskRequest> {
        self.execute(request).await.map_err(|e| match e {
            DispatchError::PoolNotConfigured => DispatchError::InvalidResourcePool,
            other => other,
        })
    }

    /// 批量分发
    pub async fn batch_execute(&self, mut request: TaskBatchRequest) -> Result<BatchDispatch> {
        let debug_mode = request.task_info.run_mode.is_debug();
        let pool = match self.resolve_pool(&request.task_info).await {
            Ok(pool) => pool,
            Err(e) => {
                if matches!(e, DispatchError::PoolNotConfigured) && !debug_mode {
                    self.mark_errors(&request.task_ids(), TaskErrorKind::InvalidResourcePool)
                        .await;
                }
                return Err(e);
            }
        };

        bind_pool(&mut request.task_info, &pool);
        for item in request.task_items.iter_mut() {
            if item.needs_report_id() {
                item.report_id = Some(new_report_id());
            }
        }

        let shards = if pool.is_orchestrated() {
            self.orchestrated_batch_execute(&pool, &mut request).await?
        } else {
            self.node_batch_execute(&pool, &mut request).await?
        };
        Ok(BatchDispatch { request, shards })
    }

    async fn resolve_pool(&self, task_info: &TaskInfo) -> Result<ResourcePool> {
        let pool = self
            .resolver
            .resolve(
                &task_info.project_id,
                task_info.run_mode_config.pool_id.as_deref(),
            )
            .await?;
        Ok(pool)
    }

    async fn node_execute(&self, pool: &ResourcePool, request: &mut TaskRequest) -> Result<()> {
        let debug_mode = request.task_info.run_mode.is_debug();
        let task_id = request.task_item.id.clone();
        let mut invalid: HashSet<String> = HashSet::new();
        let mut last_error: Option<TransportError> = None;

        while let Some(node) = self.next_live_node(pool, &invalid).await? {
            let key = node.key();
            self.size_for_node(&mut request.task_info, &node);
            debug!("任务 {} 发送到节点 {}", task_id, key);

            match self.transport.send(&node.endpoint(), request).await {
                Ok(_) => {
                    info!("任务 {} 已由节点 {} 接收", task_id, key);
                    let binding = PoolBinding {
                        pool_id: pool.id.clone(),
                        worker: Some(key),
                    };
                    if !debug_mode {
                        self.sink.record_placement(&task_id, &binding).await?;
                    }
                    request.task_item.pool_binding = Some(binding);
                    return Ok(());
                }
                Err(e) if e.is_timeout() => {
                    warn!("节点 {} 确认超时，任务 {} 按已投递处理", key, task_id);
                    return Ok(());
                }
                Err(e) => {
                    error!("节点 {} 执行任务 {} 失败: {}", key, task_id, e);
                    invalid.insert(key);
                    last_error = Some(e);
                }
            }
        }

        error!("资源池 {} 所有节点均不可用，任务 {} 未分发", pool.id, task_id);
        if !debug_mode {
            self.mark_errors(&[task_id], TaskErrorKind::InvalidResourcePool)
                .await;
        }
        Err(DispatchError::ResourceExhausted {
            source: last_error.unwrap_or_else(|| {
                TransportError::ConnectionFailed(format!("资源池 {} 没有可用节点", pool.id))
            }),
        })
    }

    /// 选择本次调用中尚未失效的节点
    async fn next_live_node(
        &self,
        pool: &ResourcePool,
        invalid: &HashSet<String>,
    ) -> Result<Option<WorkerNode>> {
        for _ in 0..pool.workers.len() {
            let node = self.selector.next_node(pool).await?;
            if !invalid.contains(&node.key()) {
                return Ok(Some(node));
            }
            if self.selector.strategy() == SelectionStrategy::FirstNode {
                return Ok(None);
            }
        }

        // 并发分发时游标可能连续落在失效节点上
        Ok(pool
            .workers
            .iter()
            .find(|node| !invalid.contains(&node.key()))
            .cloned())
    }

    async fn orchestrated_execute(
        &self,
        pool: &ResourcePool,
        request: &mut TaskRequest,
    ) -> Result<()> {
        let descriptor = pool
            .orchestrator
            .as_ref()
            .ok_or(DispatchError::PoolNotConfigured)?;
        request.task_info.per_task_size = descriptor.pod_threads;
        request.task_info.pool_size = descriptor.concurrency_limit;

        let task_id = request.task_item.id.clone();
        match self.transport.send_orchestrated(descriptor, request).await {
            Ok(_) => {
                info!("任务 {} 已提交到编排资源池 {}", task_id, pool.id);
                request.task_item.pool_binding = Some(PoolBinding {
                    pool_id: pool.id.clone(),
                    worker: None,
                });
                Ok(())
            }
            Err(e) if e.is_timeout() => {
                warn!("编排资源池 {} 确认超时，任务 {} 按已投递处理", pool.id, task_id);
                Ok(())
            }
            Err(e) => {
                error!("编排资源池 {} 执行任务 {} 失败: {}", pool.id, task_id, e);
                if !request.task_info.run_mode.is_debug() {
                    self.mark_errors(&[task_id], TaskErrorKind::InvalidResourcePool)
                        .await;
                }
                Err(DispatchError::ResourcePoolExecute(e.to_string()))
            }
        }
    }

    async fn orchestrated_batch_execute(
        &self,
        pool: &ResourcePool,
        request: &mut TaskBatchRequest,
    ) -> Result<Vec<ShardOutcome>> {
        let descriptor = pool
            .orchestrator
            .as_ref()
            .ok_or(DispatchError::PoolNotConfigured)?;
        request.task_info.per_task_size = descriptor.pod_threads;
        request.task_info.pool_size = descriptor.concurrency_limit;

        let task_ids = request.task_ids();
        match self.transport.send_orchestrated_batch(descriptor, request).await {
            Ok(_) => {
                info!("{} 个任务已提交到编排资源池 {}", task_ids.len(), pool.id);
                Ok(vec![ShardOutcome {
                    task_ids,
                    status: ShardStatus::Submitted,
                }])
            }
            Err(e) if e.is_timeout() => {
                warn!("编排资源池 {} 批量确认超时，按已投递处理", pool.id);
                Ok(vec![ShardOutcome {
                    task_ids,
                    status: ShardStatus::Submitted,
                }])
            }
            Err(e) => {
                error!("编排资源池 {} 批量执行失败: {}", pool.id, e);
                if !request.task_info.run_mode.is_debug() {
                    self.mark_errors(&task_ids, TaskErrorKind::InvalidResourcePool)
                        .await;
                }
                Err(DispatchError::ResourcePoolExecute(e.to_string()))
            }
        }
    }

    /// 分片与节点同步推进
    ///
    /// 分片 i 先发给第 i 个存活节点。发送失败的节点在本次调用内剔除，
    /// 分片继续尝试后续节点，节点列表用完后从头开始。
    async fn node_batch_execute(
        &self,
        pool: &ResourcePool,
        request: &mut TaskBatchRequest,
    ) -> Result<Vec<ShardOutcome>> {
        let debug_mode = request.task_info.run_mode.is_debug();
        let indexes: Vec<usize> = (0..request.task_items.len()).collect();
        let shards = shard_tasks(indexes, pool.workers.len());

        let mut live: Vec<WorkerNode> = pool.workers.clone();
        let mut next = 0usize;
        let mut outcomes = Vec::with_capacity(shards.len());

        for shard in shards {
            let mut shard_request = TaskBatchRequest::new(
                request.task_info.clone(),
                shard.iter().map(|&i| request.task_items[i].clone()).collect(),
            );
            let task_ids = shard_request.task_ids();
            let mut status = ShardStatus::Failed;

            while !live.is_empty() {
                if next >= live.len() {
                    next = 0;
                }
                let node = live[next].clone();
                let key = node.key();
                self.size_for_node(&mut shard_request.task_info, &node);
                debug!("{} 个任务发送到节点 {}", task_ids.len(), key);

                match self.transport.send_batch(&node.endpoint(), &shard_request).await {
                    Ok(_) => {
                        info!("节点 {} 接收 {} 个任务", key, task_ids.len());
                        status = ShardStatus::Placed { worker: key };
                        next += 1;
                        break;
                    }
                    Err(e) if e.is_timeout() => {
                        warn!("节点 {} 批量确认超时，按已投递处理", key);
                        status = ShardStatus::Submitted;
                        next += 1;
                        break;
                    }
                    Err(e) => {
                        error!("节点 {} 批量执行失败，本次不再使用: {}", key, e);
                        // 端点相同即同一节点，全部剔除
                        let before = live[..next].iter().filter(|n| n.key() == key).count();
                        live.retain(|n| n.key() != key);
                        next -= before;
                    }
                }
            }

            match &status {
                ShardStatus::Placed { worker } => {
                    let binding = PoolBinding {
                        pool_id: pool.id.clone(),
                        worker: Some(worker.clone()),
                    };
                    if !debug_mode {
                        self.sink.record_batch_placement(&task_ids, &binding).await?;
                    }
                    for &i in &shard {
                        request.task_items[i].pool_binding = Some(binding.clone());
                    }
                }
                ShardStatus::Submitted => {}
                ShardStatus::Failed => {
                    error!("资源池 {} 无可用节点，{} 个任务未分发", pool.id, task_ids.len());
                    if debug_mode {
                        return Err(DispatchError::InvalidResourcePool);
                    }
                    self.mark_errors(&task_ids, TaskErrorKind::InvalidResourcePool)
                        .await;
                }
            }
            outcomes.push(ShardOutcome { task_ids, status });
        }

        Ok(outcomes)
    }

    fn size_for_node(&self, task_info: &mut TaskInfo, node: &WorkerNode) {
        task_info.per_task_size = node
            .per_task_concurrency_limit
            .unwrap_or(self.config.default_per_task_concurrency);
        task_info.pool_size = node.concurrency_limit;
    }

    /// 记录错误标记，记录失败只打日志，保留原始错误返回给调用方
    async fn mark_errors(&self, task_ids: &[String], kind: TaskErrorKind) {
        if let Err(e) = self.sink.record_batch_task_error(task_ids, kind).await {
            error!("记录任务错误 {} 失败: {}", kind.as_str(), e);
        }
    }
}

fn bind_pool(task_info: &mut TaskInfo, pool: &ResourcePool) {
    task_info.pool_id = Some(pool.id.clone());
    if let Some(url) = pool.callback_url() {
        task_info.ms_url = Some(url.to_string());
    }
}

fn ensure_report_id(request: &mut TaskRequest) {
    if request.task_item.needs_report_id() {
        request.task_item.report_id = Some(new_report_id());
    }
}

pub(crate) fn new_report_id() -> String {
    Uuid::new_v4().simple().to_string()
}
