//! 资源池解析

use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::ResourcePool;
use crate::registry::PoolRegistry;
use crate::{PoolError, Result};

/// 资源池解析器
pub struct PoolResolver {
    registry: Arc<dyn PoolRegistry>,
}

impl PoolResolver {
    pub fn new(registry: Arc<dyn PoolRegistry>) -> Self {
        Self { registry }
    }

    /// 解析项目要使用的资源池
    ///
    /// 未显式指定时使用项目默认资源池。资源池不存在、禁用、删除、
    /// 无节点或项目未授权时统一返回 [`PoolError::NotConfigured`]。
    pub async fn resolve(&self, project_id: &str, explicit_pool_id: Option<&str>) -> Result<ResourcePool> {
        let pool_id = match explicit_pool_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => self
                .registry
                .get_project_default_pool_id(project_id)
                .await?
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| {
                    warn!("项目 {} 未配置默认资源池", project_id);
                    PoolError::NotConfigured
                })?,
        };

        let pool = self
            .registry
            .get_pool(&pool_id)
            .await?
            .filter(ResourcePool::is_usable)
            .ok_or_else(|| {
                warn!("资源池 {} 不存在或不可用", pool_id);
                PoolError::NotConfigured
            })?;

        if !self.registry.is_project_authorized(&pool, project_id).await? {
            warn!("项目 {} 无权使用资源池 {}", project_id, pool_id);
            return Err(PoolError::NotConfigured);
        }

        debug!("项目 {} 使用资源池 {}", project_id, pool.id);
        Ok(pool)
    }
}
