// 数据库集成测试
use apirun_compiler::{ReportStep, StepType};
use apirun_dispatcher::{ReportSink, ScenarioReport, ScenarioReportStore, TaskErrorKind};
use apirun_pool::{PoolRegistry, PoolResolver, ResourcePool, WorkerNode};
use apirun_storage::{RecordKind, Storage, StorageError, StorageManager};
use apirun_transport::{OrchestratorDescriptor, PoolBinding};
use chrono::Utc;
use std::sync::Arc;

/// 创建测试数据库 (内存模式)
async fn setup_storage() -> Storage {
    let manager = StorageManager::new_in_memory()
        .await
        .expect("Failed to create test database");
    Storage::from_manager(&manager)
}

fn worker_pool(id: &str) -> ResourcePool {
    let mut pool = ResourcePool::worker_list(
        id,
        vec![
            WorkerNode::new("10.0.0.1", 8000).with_concurrency(4, Some(2)),
            WorkerNode::new("10.0.0.2", 8000),
        ],
    );
    pool.name = format!("pool {}", id);
    pool
}

fn report(id: &str) -> ScenarioReport {
    ScenarioReport {
        id: id.to_string(),
        scenario_id: "scenario-1".to_string(),
        project_id: "proj".to_string(),
        name: "下单流程".to_string(),
        task_item_id: "item-1".to_string(),
        environment_id: Some("env-1".to_string()),
        pool_id: None,
        trigger_mode: Some("MANUAL".to_string()),
        user_id: None,
        integrated: false,
        waiting_time: Some(1500),
        status: "PENDING".to_string(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_pool_round_trip_keeps_node_order() {
    let storage = setup_storage().await;
    storage.pools().save(&worker_pool("p1")).await.unwrap();
    storage
        .pools()
        .add_node("p1", &WorkerNode::new("10.0.0.3", 9000))
        .await
        .unwrap();

    let pool = storage.pools().get("p1").await.unwrap().unwrap();
    let keys: Vec<String> = pool.workers.iter().map(WorkerNode::key).collect();
    assert_eq!(keys, vec!["10.0.0.1:8000", "10.0.0.2:8000", "10.0.0.3:9000"]);
    assert_eq!(pool.workers[0].concurrency_limit, 4);
    assert_eq!(pool.workers[0].per_task_concurrency_limit, Some(2));
    assert_eq!(pool.workers[1].per_task_concurrency_limit, None);
}

#[tokio::test]
async fn test_add_node_to_missing_pool() {
    let storage = setup_storage().await;
    let result = storage
        .pools()
        .add_node("missing", &WorkerNode::new("10.0.0.3", 9000))
        .await;
    match result {
        Err(StorageError::NotFound { kind, id }) => {
            assert_eq!(kind, RecordKind::ResourcePool);
            assert_eq!(id, "missing");
        }
        other => panic!("expected missing resource pool, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resave_pool_replaces_record_and_nodes() {
    let storage = setup_storage().await;
    storage.pools().save(&worker_pool("p1")).await.unwrap();

    let mut updated = ResourcePool::worker_list("p1", vec![WorkerNode::new("10.0.0.5", 8100)]);
    updated.name = "renamed".to_string();
    storage.pools().save(&updated).await.unwrap();

    let pool = storage.pools().get("p1").await.unwrap().unwrap();
    assert_eq!(pool.name, "renamed");
    let keys: Vec<String> = pool.workers.iter().map(WorkerNode::key).collect();
    assert_eq!(keys, vec!["10.0.0.5:8100"]);
}

#[tokio::test]
async fn test_failed_node_write_keeps_previous_pool() {
    let storage = setup_storage().await;
    storage.pools().save(&worker_pool("p1")).await.unwrap();
    sqlx::query(
        r#"
        CREATE TRIGGER reject_node BEFORE INSERT ON resource_pool_nodes
        WHEN NEW.ip = '10.0.0.9'
        BEGIN SELECT RAISE(ABORT, 'node rejected'); END
        "#,
    )
    .execute(storage.pool())
    .await
    .unwrap();

    let mut updated = ResourcePool::worker_list(
        "p1",
        vec![WorkerNode::new("10.0.0.5", 8100), WorkerNode::new("10.0.0.9", 8100)],
    );
    updated.name = "renamed".to_string();
    updated.enabled = false;
    assert!(storage.pools().save(&updated).await.is_err());

    // 资源池记录和节点一起回滚
    let pool = storage.pools().get("p1").await.unwrap().unwrap();
    assert_eq!(pool.name, "pool p1");
    assert!(pool.enabled);
    let keys: Vec<String> = pool.workers.iter().map(WorkerNode::key).collect();
    assert_eq!(keys, vec!["10.0.0.1:8000", "10.0.0.2:8000"]);
}

#[tokio::test]
async fn test_orchestrated_pool_round_trip() {
    let storage = setup_storage().await;
    let descriptor = OrchestratorDescriptor {
        api_url: "https://k8s.local".into(),
        token: Some("token".into()),
        namespace: "ms".into(),
        deploy_name: "task-runner".into(),
        concurrency_limit: 20,
        pod_threads: 2,
    };
    storage
        .pools()
        .save(&ResourcePool::orchestrated("k1", descriptor.clone()))
        .await
        .unwrap();

    let pool = storage.pools().get("k1").await.unwrap().unwrap();
    assert!(pool.is_orchestrated());
    assert_eq!(pool.orchestrator, Some(descriptor));
}

#[tokio::test]
async fn test_registry_resolution() {
    let storage = Arc::new(setup_storage().await);
    storage.pools().save(&worker_pool("p1")).await.unwrap();
    storage.pools().save(&worker_pool("p2")).await.unwrap();
    storage.pools().set_project_default("proj", "p1").await.unwrap();

    let resolver = PoolResolver::new(storage.clone());
    assert_eq!(resolver.resolve("proj", None).await.unwrap().id, "p1");

    // 未授权
    assert!(resolver.resolve("proj", Some("p2")).await.is_err());
    storage.pools().grant("proj", "p2").await.unwrap();
    assert_eq!(resolver.resolve("proj", Some("p2")).await.unwrap().id, "p2");

    // 禁用和删除
    storage.pools().set_enabled("p2", false).await.unwrap();
    assert!(resolver.resolve("proj", Some("p2")).await.is_err());
    storage.pools().delete("p1").await.unwrap();
    assert!(resolver.resolve("proj", None).await.is_err());

    assert_eq!(
        storage.get_project_default_pool_id("other").await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_placement_and_error_markers() {
    let storage = setup_storage().await;
    let binding = PoolBinding {
        pool_id: "p1".into(),
        worker: Some("10.0.0.1:8000".into()),
    };

    storage.record_placement("item-1", &binding).await.unwrap();
    storage
        .record_batch_placement(&["item-2".into(), "item-3".into()], &binding)
        .await
        .unwrap();
    storage
        .record_task_error("item-4", TaskErrorKind::InvalidResourcePool)
        .await
        .unwrap();

    let item = storage.task_items().get("item-3").await.unwrap().unwrap();
    assert_eq!(item.resource_pool_id.as_deref(), Some("p1"));
    assert_eq!(item.resource_pool_node.as_deref(), Some("10.0.0.1:8000"));
    assert_eq!(item.error_message, None);

    let errors = storage.task_items().list_errors().await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].id, "item-4");
    assert_eq!(errors[0].error_message.as_deref(), Some("INVALID_RESOURCE_POOL"));
}

#[tokio::test]
async fn test_report_created_once() {
    let storage = setup_storage().await;

    assert!(storage.init_report(&report("r1")).await.unwrap());

    let mut retried = report("r1");
    retried.name = "renamed".to_string();
    assert!(!storage.init_report(&retried).await.unwrap());

    assert_eq!(storage.reports().count().await.unwrap(), 1);
    let stored = storage.reports().get("r1").await.unwrap().unwrap();
    assert_eq!(stored.name, "下单流程");
    assert_eq!(stored.waiting_time, Some(1500));
}

#[tokio::test]
async fn test_report_steps_ignore_duplicates() {
    let storage = setup_storage().await;
    storage.init_report(&report("r1")).await.unwrap();

    let steps = vec![
        ReportStep {
            report_id: "r1".into(),
            step_id: "u-1".into(),
            parent_id: None,
            sort: 1,
            name: "下单".into(),
            step_type: StepType::Api,
        },
        ReportStep {
            report_id: "r1".into(),
            step_id: "u-2".into(),
            parent_id: Some("u-1".into()),
            sort: 1,
            name: "等待".into(),
            step_type: StepType::ConstantTimer,
        },
    ];
    storage.init_report_steps(&steps).await.unwrap();
    storage.init_report_steps(&steps).await.unwrap();

    let stored = storage.reports().list_steps("r1").await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().any(|s| s.step_type == "CONSTANT_TIMER"));
}

#[tokio::test]
async fn test_remove_execution_set_item() {
    let storage = setup_storage().await;
    storage.reports().add_execution_set_item("task-1", "item-1").await.unwrap();
    storage.reports().add_execution_set_item("task-1", "item-2").await.unwrap();

    storage
        .remove_execution_set_item("task-1", "item-1")
        .await
        .unwrap();

    assert_eq!(
        storage.reports().list_execution_set_items("task-1").await.unwrap(),
        vec!["item-2".to_string()]
    );
}
