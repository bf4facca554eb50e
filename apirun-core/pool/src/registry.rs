//! 资源池注册表

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::model::ResourcePool;
use crate::Result;

/// 资源池注册表接口
#[async_trait]
pub trait PoolRegistry: Send + Sync {
    /// 按 ID 查询资源池，不存在返回 None
    async fn get_pool(&self, pool_id: &str) -> Result<Option<ResourcePool>>;

    /// 项目默认资源池 ID
    async fn get_project_default_pool_id(&self, project_id: &str) -> Result<Option<String>>;

    /// 项目是否有权使用该资源池
    async fn is_project_authorized(&self, pool: &ResourcePool, project_id: &str) -> Result<bool>;
}

/// 内存注册表
#[derive(Default)]
pub struct InMemoryPoolRegistry {
    pools: RwLock<HashMap<String, ResourcePool>>,
    defaults: RwLock<HashMap<String, String>>,
    grants: RwLock<HashSet<(String, String)>>,
}

impl InMemoryPoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_pool(&self, pool: ResourcePool) {
        self.pools.write().await.insert(pool.id.clone(), pool);
    }

    /// 授权并设为项目默认资源池
    pub async fn set_project_default(&self, project_id: &str, pool_id: &str) {
        self.grant(project_id, pool_id).await;
        self.defaults
            .write()
            .await
            .insert(project_id.to_string(), pool_id.to_string());
    }

    pub async fn grant(&self, project_id: &str, pool_id: &str) {
        self.grants
            .write()
            .await
            .insert((pool_id.to_string(), project_id.to_string()));
    }
}

#[async_trait]
impl PoolRegistry for InMemoryPoolRegistry {
    async fn get_pool(&self, pool_id: &str) -> Result<Option<ResourcePool>> {
        Ok(self.pools.read().await.get(pool_id).cloned())
    }

    async fn get_project_default_pool_id(&self, project_id: &str) -> Result<Option<String>> {
        Ok(self.defaults.read().await.get(project_id).cloned())
    }

    async fn is_project_authorized(&self, pool: &ResourcePool, project_id: &str) -> Result<bool> {
        Ok(self
            .grants
            .read()
            .await
            .contains(&(pool.id.clone(), project_id.to_string())))
    }
}
