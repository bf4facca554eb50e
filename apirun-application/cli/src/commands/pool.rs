//! 资源池管理命令

use anyhow::{bail, Result};
use colored::Colorize;
use serde::Serialize;

use apirun_pool::{ResourcePool, WorkerNode};
use apirun_storage::Storage;
use apirun_transport::OrchestratorDescriptor;

use super::common::load_context;
use super::output::{output_formatted, TableRow};

pub async fn handle(action: crate::PoolAction) -> Result<()> {
    let (_, storage) = load_context().await?;

    match action {
        crate::PoolAction::Add {
            id,
            name,
            server_url,
        } => add_pool(&storage, &id, name, server_url).await,
        crate::PoolAction::AddOrchestrated {
            id,
            api_url,
            namespace,
            deploy,
            token,
            concurrency,
            pod_threads,
        } => {
            let descriptor = OrchestratorDescriptor {
                api_url,
                token,
                namespace,
                deploy_name: deploy,
                concurrency_limit: concurrency,
                pod_threads,
            };
            add_orchestrated(&storage, &id, descriptor).await
        }
        crate::PoolAction::NodeAdd {
            pool,
            ip,
            port,
            concurrency,
            per_task,
        } => {
            let node = WorkerNode::new(&ip, port).with_concurrency(concurrency, per_task);
            storage.pools().add_node(&pool, &node).await?;
            println!("{} 节点 {} 已加入资源池 {}", "✓".green(), node.key(), pool);
            Ok(())
        }
        crate::PoolAction::NodeRemove { pool, ip, port } => {
            if storage.pools().remove_node(&pool, &ip, port).await? {
                println!("{} 节点 {}:{} 已移除", "✓".green(), ip, port);
            } else {
                println!("{} 资源池 {} 中没有节点 {}:{}", "ℹ".yellow(), pool, ip, port);
            }
            Ok(())
        }
        crate::PoolAction::List { format } => list_pools(&storage, &format).await,
        crate::PoolAction::Grant { project, pool } => {
            ensure_pool(&storage, &pool).await?;
            storage.pools().grant(&project, &pool).await?;
            println!("{} 项目 {} 已授权使用资源池 {}", "✓".green(), project, pool);
            Ok(())
        }
        crate::PoolAction::Default { project, pool } => {
            ensure_pool(&storage, &pool).await?;
            storage.pools().set_project_default(&project, &pool).await?;
            println!("{} 项目 {} 的默认资源池设置为 {}", "✓".green(), project, pool);
            Ok(())
        }
        crate::PoolAction::Enable { id } => set_enabled(&storage, &id, true).await,
        crate::PoolAction::Disable { id } => set_enabled(&storage, &id, false).await,
        crate::PoolAction::Delete { id } => {
            if storage.pools().delete(&id).await? {
                println!("{} 资源池 {} 已删除", "✓".green(), id);
            } else {
                println!("{} 未找到资源池: {}", "✗".red(), id);
            }
            Ok(())
        }
    }
}

async fn add_pool(
    storage: &Storage,
    id: &str,
    name: Option<String>,
    server_url: Option<String>,
) -> Result<()> {
    // 保留已有节点
    let workers = match storage.pools().get(id).await? {
        Some(existing) => existing.workers,
        None => Vec::new(),
    };

    let mut pool = ResourcePool::worker_list(id, workers);
    if let Some(name) = name {
        pool.name = name;
    }
    pool.server_url = server_url;
    storage.pools().save(&pool).await?;

    println!("{} 资源池 {} 已保存", "✓".green(), id);
    if pool.workers.is_empty() {
        println!("  使用 {} 添加执行节点", "apirun pool node-add".cyan());
    }
    Ok(())
}

async fn add_orchestrated(
    storage: &Storage,
    id: &str,
    descriptor: OrchestratorDescriptor,
) -> Result<()> {
    let pool = ResourcePool::orchestrated(id, descriptor);
    storage.pools().save(&pool).await?;
    println!("{} 编排资源池 {} 已保存", "✓".green(), id);
    Ok(())
}

async fn set_enabled(storage: &Storage, id: &str, enabled: bool) -> Result<()> {
    if !storage.pools().set_enabled(id, enabled).await? {
        bail!("未找到资源池: {}", id);
    }
    let state = if enabled { "启用".green() } else { "禁用".yellow() };
    println!("{} 资源池 {} 已{}", "✓".green(), id, state);
    Ok(())
}

async fn ensure_pool(storage: &Storage, id: &str) -> Result<()> {
    if storage.pools().get_record(id).await?.is_none() {
        bail!("未找到资源池: {}", id);
    }
    Ok(())
}

async fn list_pools(storage: &Storage, format: &str) -> Result<()> {
    let pools = storage.pools().list_all().await?;
    if pools.is_empty() {
        println!("{} 没有配置资源池", "ℹ".yellow());
        return Ok(());
    }

    let rows: Vec<PoolRow> = pools.iter().map(PoolRow::from).collect();
    output_formatted(&rows, format)
}

/// 资源池列表行
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolRow {
    id: String,
    name: String,
    pool_type: &'static str,
    status: &'static str,
    usable: bool,
    nodes: Vec<String>,
}

impl From<&ResourcePool> for PoolRow {
    fn from(pool: &ResourcePool) -> Self {
        let status = if pool.deleted {
            "DELETED"
        } else if pool.enabled {
            "ENABLED"
        } else {
            "DISABLED"
        };
        let nodes = match &pool.orchestrator {
            Some(descriptor) if pool.is_orchestrated() => {
                vec![format!("{}/{}", descriptor.namespace, descriptor.deploy_name)]
            }
            _ => pool.workers.iter().map(WorkerNode::key).collect(),
        };

        Self {
            id: pool.id.clone(),
            name: pool.name.clone(),
            pool_type: pool.pool_type.as_str(),
            status,
            usable: pool.is_usable(),
            nodes,
        }
    }
}

impl TableRow for PoolRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "名称", "类型", "状态", "节点"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.pool_type.to_string(),
            self.status.to_string(),
            self.nodes.join(","),
        ]
    }
}
