//! 内存数据源
//!
//! 用于命令行的场景包编译和测试。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::source::{
    Blob, BlobStore, DefinitionCatalog, DefinitionExecuteInfo, Environment, EnvironmentService,
    ResourceKind,
};
use crate::Result;

/// 内存内容存储
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: HashMap<(ResourceKind, String), String>,
    fetches: AtomicUsize,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ResourceKind, id: &str, content: impl Into<String>) {
        self.blobs.insert((kind, id.to_string()), content.into());
    }

    pub fn with_blob(mut self, kind: ResourceKind, id: &str, content: impl Into<String>) -> Self {
        self.insert(kind, id, content);
        self
    }

    /// 批量查询次数
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get_blobs(&self, kind: ResourceKind, ids: &[String]) -> Result<Vec<Blob>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.blobs
                    .get(&(kind, id.clone()))
                    .map(|content| Blob::new(id, content.clone()))
            })
            .collect())
    }
}

/// 内存环境服务
#[derive(Debug, Default)]
pub struct InMemoryEnvironmentService {
    environments: HashMap<String, Environment>,
    groups: HashMap<String, Vec<String>>,
}

impl InMemoryEnvironmentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_environment(&mut self, environment: Environment) {
        self.environments
            .insert(environment.id.clone(), environment);
    }

    pub fn add_group(&mut self, group_id: &str, members: Vec<String>) {
        self.groups.insert(group_id.to_string(), members);
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.add_environment(environment);
        self
    }

    pub fn with_group(mut self, group_id: &str, members: Vec<String>) -> Self {
        self.add_group(group_id, members);
        self
    }
}

#[async_trait]
impl EnvironmentService for InMemoryEnvironmentService {
    async fn get_environments(&self, ids: &[String]) -> Result<Vec<Environment>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.environments.get(id).cloned())
            .collect())
    }

    async fn get_environment_group_members(
        &self,
        group_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        Ok(group_ids
            .iter()
            .filter_map(|id| self.groups.get(id).map(|m| (id.clone(), m.clone())))
            .collect())
    }
}

/// 内存接口目录
#[derive(Debug, Default)]
pub struct InMemoryDefinitionCatalog {
    infos: HashMap<(ResourceKind, String), DefinitionExecuteInfo>,
}

impl InMemoryDefinitionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ResourceKind, info: DefinitionExecuteInfo) {
        self.infos.insert((kind, info.resource_id.clone()), info);
    }

    pub fn with_info(mut self, kind: ResourceKind, info: DefinitionExecuteInfo) -> Self {
        self.insert(kind, info);
        self
    }
}

#[async_trait]
impl DefinitionCatalog for InMemoryDefinitionCatalog {
    async fn get_execute_info(
        &self,
        kind: ResourceKind,
        ids: &[String],
    ) -> Result<Vec<DefinitionExecuteInfo>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.infos.get(&(kind, id.clone())).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blob_store_skips_missing() {
        let store = InMemoryBlobStore::new().with_blob(ResourceKind::Definition, "a", "{}");
        let blobs = store
            .get_blobs(
                ResourceKind::Definition,
                &["a".to_string(), "b".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(blobs, vec![Blob::new("a", "{}")]);
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_blob_kinds_are_separate() {
        let store = InMemoryBlobStore::new().with_blob(ResourceKind::Case, "a", "{}");
        let blobs = store
            .get_blobs(ResourceKind::Definition, &["a".to_string()])
            .await
            .unwrap();
        assert!(blobs.is_empty());
    }
}
