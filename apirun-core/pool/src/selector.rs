//! 节点选择 (单任务分发)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::model::{ResourcePool, WorkerNode};
use crate::{PoolError, Result};

/// 节点选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// 轮询
    #[default]
    RoundRobin,
    /// 始终使用第一个节点 (未开启负载均衡)
    FirstNode,
}

/// 节点选择配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default)]
    pub strategy: SelectionStrategy,
}

/// 资源池的轮询游标
///
/// 记录创建游标时的节点列表快照，节点列表变化后重新创建。
#[derive(Debug)]
pub struct RoundRobinCursor {
    endpoints: Vec<String>,
    next: AtomicUsize,
}

impl RoundRobinCursor {
    pub fn new(workers: &[WorkerNode]) -> Self {
        Self {
            endpoints: workers.iter().map(WorkerNode::key).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// 快照是否与当前节点列表一致
    pub fn matches(&self, workers: &[WorkerNode]) -> bool {
        self.endpoints.len() == workers.len()
            && self
                .endpoints
                .iter()
                .zip(workers)
                .all(|(endpoint, worker)| *endpoint == worker.key())
    }

    /// 返回当前下标并前移，按节点数回绕
    pub fn advance(&self) -> usize {
        let len = self.endpoints.len().max(1);
        self.next.fetch_add(1, Ordering::SeqCst) % len
    }
}

/// 节点选择器
///
/// 游标在进程内按资源池共享，并发分发同一资源池时通过原子自增推进。
pub struct NodeSelector {
    cursors: RwLock<HashMap<String, Arc<RoundRobinCursor>>>,
    config: SelectorConfig,
}

impl NodeSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            cursors: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.config.strategy
    }

    /// 选出下一个节点
    pub async fn next_node(&self, pool: &ResourcePool) -> Result<WorkerNode> {
        let first = pool
            .workers
            .first()
            .ok_or_else(|| PoolError::NoWorkers(pool.id.clone()))?;

        if self.config.strategy == SelectionStrategy::FirstNode {
            return Ok(first.clone());
        }

        let cursor = self.cursor_for(pool).await;
        let index = cursor.advance();

        // 节点列表在并发中缩短时回退到第一个节点
        let node = pool.workers.get(index).unwrap_or(first);
        debug!("资源池 {} 轮询选中节点 {} (下标 {})", pool.id, node.key(), index);
        Ok(node.clone())
    }

    async fn cursor_for(&self, pool: &ResourcePool) -> Arc<RoundRobinCursor> {
        {
            let cursors = self.cursors.read().await;
            if let Some(cursor) = cursors.get(&pool.id) {
                if cursor.matches(&pool.workers) {
                    return cursor.clone();
                }
            }
        }

        let mut cursors = self.cursors.write().await;
        // 获取写锁期间可能已被其他调用重建
        if let Some(cursor) = cursors.get(&pool.id) {
            if cursor.matches(&pool.workers) {
                return cursor.clone();
            }
        }

        info!("初始化资源池 {} 的轮询游标，节点数: {}", pool.id, pool.workers.len());
        let cursor = Arc::new(RoundRobinCursor::new(&pool.workers));
        cursors.insert(pool.id.clone(), cursor.clone());
        cursor
    }

    /// 丢弃资源池的游标
    pub async fn reset(&self, pool_id: &str) {
        self.cursors.write().await.remove(pool_id);
    }
}

impl Default for NodeSelector {
    fn default() -> Self {
        Self::new(SelectorConfig::default())
    }
}
