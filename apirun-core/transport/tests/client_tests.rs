//! 执行节点客户端测试

use apirun_transport::*;
use mockito::{Matcher, Server};

fn endpoint_of(server: &Server) -> WorkerEndpoint {
    let addr = server.host_with_port();
    let (ip, port) = addr.rsplit_once(':').unwrap();
    WorkerEndpoint::new(ip, port.parse().unwrap())
}

fn request(run_mode: RunMode) -> TaskRequest {
    TaskRequest::new(
        TaskInfo::new("task-1", "project-1").with_run_mode(run_mode),
        ExecutionTask::new("item-1", "case-1").with_report_id("report-1"),
    )
}

#[tokio::test]
async fn test_send_run_posts_to_run_endpoint() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/run")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "taskItem": { "id": "item-1", "reportId": "report-1" }
        })))
        .with_status(200)
        .with_body(r#"{"code":100200,"message":"ok"}"#)
        .create_async()
        .await;

    let transport = HttpWorkerTransport::new(TransportConfig::default()).unwrap();
    let ack = transport
        .send(&endpoint_of(&server), &request(RunMode::Run))
        .await
        .unwrap();

    assert_eq!(ack.code, Some(100200));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_send_debug_posts_to_debug_endpoint() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/debug")
        .with_status(200)
        .create_async()
        .await;

    let transport = HttpWorkerTransport::new(TransportConfig::default()).unwrap();
    let ack = transport
        .send(&endpoint_of(&server), &request(RunMode::BackendDebug))
        .await
        .unwrap();

    assert_eq!(ack, Ack::default());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_send_rejected_by_worker() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/run")
        .with_status(500)
        .with_body(r#"{"code":104003,"message":"节点资源不足"}"#)
        .create_async()
        .await;

    let transport = HttpWorkerTransport::new(TransportConfig::default()).unwrap();
    let err = transport
        .send(&endpoint_of(&server), &request(RunMode::Run))
        .await
        .unwrap_err();

    match err {
        TransportError::Rejected {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 500);
            assert_eq!(code, Some(104003));
            assert_eq!(message, "节点资源不足");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_send_batch() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/batch/run")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "taskInfo": { "taskId": "task-1" }
        })))
        .with_status(200)
        .create_async()
        .await;

    let batch = TaskBatchRequest::new(
        TaskInfo::new("task-1", "project-1"),
        vec![
            ExecutionTask::new("a", "case-a"),
            ExecutionTask::new("b", "case-b"),
        ],
    );

    let transport = HttpWorkerTransport::new(TransportConfig::default()).unwrap();
    transport
        .send_batch(&endpoint_of(&server), &batch)
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_send_orchestrated_with_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/namespaces/ms/deployments/runner/tasks")
        .match_header("Token", "secret")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "concurrencyLimit": 4
        })))
        .with_status(200)
        .create_async()
        .await;

    let descriptor = OrchestratorDescriptor {
        api_url: server.url(),
        token: Some("secret".to_string()),
        namespace: "ms".to_string(),
        deploy_name: "runner".to_string(),
        concurrency_limit: 4,
        pod_threads: 1,
    };

    let transport = HttpWorkerTransport::new(TransportConfig::default()).unwrap();
    transport
        .send_orchestrated(&descriptor, &request(RunMode::Run))
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_worker_is_not_timeout() {
    let transport = HttpWorkerTransport::new(TransportConfig {
        connect_timeout: 1,
        ..Default::default()
    })
    .unwrap();

    // 端口 1 上没有服务，连接会被立即拒绝
    let err = transport
        .send(&WorkerEndpoint::new("127.0.0.1", 1), &request(RunMode::Run))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::ConnectionFailed(_)));
    assert!(!err.is_timeout());
}
