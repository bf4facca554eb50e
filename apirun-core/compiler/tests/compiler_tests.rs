//! 步骤树编译测试

use apirun_compiler::*;
use serde_json::json;
use std::sync::Arc;

struct Fixture {
    blobs: Arc<InMemoryBlobStore>,
    compiler: StepTreeCompiler,
}

fn fixture(blobs: InMemoryBlobStore) -> Fixture {
    fixture_with(blobs, InMemoryEnvironmentService::new(), InMemoryDefinitionCatalog::new())
}

fn fixture_with(
    blobs: InMemoryBlobStore,
    environments: InMemoryEnvironmentService,
    catalog: InMemoryDefinitionCatalog,
) -> Fixture {
    let blobs = Arc::new(blobs);
    let compiler = StepTreeCompiler::new(blobs.clone(), Arc::new(environments), Arc::new(catalog));
    Fixture { blobs, compiler }
}

fn root() -> RootScenario {
    RootScenario {
        resource_id: "scenario-root".to_string(),
        project_id: Some("project-1".to_string()),
        name: "登录流程".to_string(),
        config: None,
    }
}

fn http(method: &str, path: &str) -> String {
    json!({ "method": method, "path": path }).to_string()
}

fn env(id: &str, project: &str) -> Environment {
    Environment {
        id: id.to_string(),
        project_id: project.to_string(),
        name: id.to_string(),
        config: json!({ "host": format!("{}.local", id) }),
    }
}

fn step_ids(element: &ExecutableElement) -> Vec<String> {
    let mut ids = Vec::new();
    element.walk(&mut |e| ids.push(e.step_id.clone()));
    ids
}

#[tokio::test]
async fn test_disabled_container_prunes_whole_branch() {
    let blobs = InMemoryBlobStore::new()
        .with_blob(ResourceKind::Step, "r1", http("GET", "/a"))
        .with_blob(ResourceKind::Step, "r2", http("GET", "/b"))
        .with_blob(ResourceKind::Step, "r3", http("GET", "/c"));
    let f = fixture(blobs);

    let mut steps = vec![
        StepNode::new("group", StepType::IfController)
            .disabled()
            .with_children(vec![
                StepNode::new("r1", StepType::CustomRequest),
                StepNode::new("r2", StepType::CustomRequest),
            ]),
        StepNode::new("r3", StepType::CustomRequest),
    ];

    let compiled = f
        .compiler
        .compile(&root(), &mut steps, &CompileContext::default())
        .await
        .unwrap();

    assert_eq!(compiled.root.children.len(), 1);
    assert_eq!(compiled.root.children[0].resource_id, None);
    assert_eq!(compiled.meta.request_count, 1);
    assert!(steps[0].children.iter().all(|s| s.unique_id.is_none()));
}

#[tokio::test]
async fn test_existing_unique_ids_are_stable() {
    let blobs = InMemoryBlobStore::new()
        .with_blob(ResourceKind::Step, "s1", http("GET", "/a"))
        .with_blob(ResourceKind::Step, "s2", r#"{"script":"vars.put('a','1')"}"#);
    let f = fixture(blobs);

    let steps = vec![
        StepNode::new("s1", StepType::CustomRequest).with_unique_id("u-1"),
        StepNode::new("loop", StepType::LoopController)
            .with_unique_id("u-2")
            .with_children(vec![StepNode::new("s2", StepType::Script).with_unique_id("u-3")]),
    ];

    let first = f
        .compiler
        .compile(&root(), &mut steps.clone(), &CompileContext::default())
        .await
        .unwrap();
    let second = f
        .compiler
        .compile(&root(), &mut steps.clone(), &CompileContext::default())
        .await
        .unwrap();

    assert_eq!(step_ids(&first.root), step_ids(&second.root));
    assert_eq!(
        step_ids(&first.root),
        vec!["scenario-root", "u-1", "u-2", "u-3"]
    );
}

#[tokio::test]
async fn test_assigned_ids_stable_for_same_report() {
    let blobs = InMemoryBlobStore::new().with_blob(ResourceKind::Step, "s1", http("GET", "/a"));
    let f = fixture(blobs);
    let context = CompileContext {
        report_id: Some("report-1".to_string()),
        ..Default::default()
    };

    let mut first_steps = vec![StepNode::new("s1", StepType::CustomRequest)];
    let mut retry_steps = first_steps.clone();

    let first = f.compiler.compile(&root(), &mut first_steps, &context).await.unwrap();
    let retry = f.compiler.compile(&root(), &mut retry_steps, &context).await.unwrap();

    assert_eq!(first.root.children[0].step_id, retry.root.children[0].step_id);
    // 写回调用方的步骤树
    assert_eq!(
        first_steps[0].unique_id.as_deref(),
        Some(first.root.children[0].step_id.as_str())
    );

    // 报告步骤与编译结果使用同一个唯一 ID
    let mut fresh = vec![StepNode::new("s1", StepType::CustomRequest)];
    let report_steps = build_report_steps("report-1", &mut fresh);
    assert_eq!(report_steps[0].step_id, first.root.children[0].step_id);
}

#[tokio::test]
async fn test_references_fetched_once_per_kind() {
    let blobs = InMemoryBlobStore::new()
        .with_blob(ResourceKind::Definition, "api-1", http("GET", "/users"))
        .with_blob(ResourceKind::Definition, "api-2", http("POST", "/users"))
        .with_blob(ResourceKind::Case, "case-1", http("GET", "/orders"))
        .with_blob(ResourceKind::Case, "case-2", http("DELETE", "/orders/1"));
    let f = fixture(blobs);

    let mut steps = vec![
        StepNode::new("a1", StepType::Api).with_ref(RefType::FullRef, "api-1"),
        StepNode::new("a2", StepType::Api).with_ref(RefType::FullRef, "api-2"),
        StepNode::new("c1", StepType::ApiCase).with_ref(RefType::FullRef, "case-1"),
        StepNode::new("c2", StepType::ApiCase).with_ref(RefType::FullRef, "case-2"),
        StepNode::new("c3", StepType::ApiCase).with_ref(RefType::FullRef, "case-1"),
    ];

    let compiled = f
        .compiler
        .compile(&root(), &mut steps, &CompileContext::default())
        .await
        .unwrap();

    assert_eq!(compiled.meta.request_count, 5);
    // 完全引用不查询步骤详情: 接口定义一次 + 接口用例一次
    assert_eq!(f.blobs.fetch_count(), 2);
    assert!(compiled.meta.file_resource_ids.contains("api-1"));
    assert!(compiled.meta.file_step_scenario_map.is_empty());
}

#[tokio::test]
async fn test_missing_reference_is_resource_not_found() {
    let f = fixture(InMemoryBlobStore::new());
    let mut steps = vec![StepNode::new("a1", StepType::Api).with_ref(RefType::FullRef, "api-deleted")];

    let err = f
        .compiler
        .compile(&root(), &mut steps, &CompileContext::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CompileError::ResourceNotFound {
            kind: ResourceKind::Definition,
            id: "api-deleted".to_string(),
        }
    );
}

#[tokio::test]
async fn test_disabled_missing_reference_is_ignored() {
    let f = fixture(InMemoryBlobStore::new());
    let mut steps = vec![StepNode::new("a1", StepType::Api)
        .with_ref(RefType::FullRef, "api-deleted")
        .disabled()];

    let compiled = f
        .compiler
        .compile(&root(), &mut steps, &CompileContext::default())
        .await
        .unwrap();
    assert!(compiled.root.children.is_empty());
}

#[tokio::test]
async fn test_corrupted_step_is_skipped() {
    let blobs = InMemoryBlobStore::new()
        .with_blob(ResourceKind::Step, "bad", "{broken")
        .with_blob(ResourceKind::Step, "good", http("GET", "/ok"));
    let f = fixture(blobs);

    let mut steps = vec![
        StepNode::new("bad", StepType::CustomRequest),
        StepNode::new("good", StepType::CustomRequest),
    ];
    let compiled = f
        .compiler
        .compile(&root(), &mut steps, &CompileContext::default())
        .await
        .unwrap();

    assert_eq!(compiled.root.children.len(), 1);
    assert_eq!(compiled.meta.request_count, 1);
    assert_eq!(
        compiled.meta.file_step_scenario_map.get("good").map(String::as_str),
        Some("scenario-root")
    );
}

#[tokio::test]
async fn test_copied_api_keeps_own_method_and_path() {
    let blobs = InMemoryBlobStore::new()
        .with_blob(ResourceKind::Definition, "api-1", http("GET", "/users"))
        .with_blob(ResourceKind::Step, "copy", http("PUT", "/users/override"));
    let catalog = InMemoryDefinitionCatalog::new().with_info(
        ResourceKind::Definition,
        DefinitionExecuteInfo {
            resource_id: "api-1".to_string(),
            module_id: Some("module-users".to_string()),
            method: Some("GET".to_string()),
            path: Some("/users".to_string()),
        },
    );
    let f = fixture_with(blobs, InMemoryEnvironmentService::new(), catalog);

    let mut steps = vec![
        StepNode::new("ref", StepType::Api).with_ref(RefType::FullRef, "api-1"),
        StepNode::new("copy", StepType::Api).with_ref(RefType::PartialRef, "api-1"),
    ];
    let compiled = f
        .compiler
        .compile(&root(), &mut steps, &CompileContext::default())
        .await
        .unwrap();

    let bodies: Vec<(String, String, Option<String>)> = compiled
        .root
        .children
        .iter()
        .map(|e| match &e.body {
            ElementBody::Http(http) => (http.method.clone(), http.path.clone(), http.module_id.clone()),
            other => panic!("unexpected body: {:?}", other),
        })
        .collect();

    assert_eq!(
        bodies,
        vec![
            ("GET".to_string(), "/users".to_string(), Some("module-users".to_string())),
            ("PUT".to_string(), "/users/override".to_string(), Some("module-users".to_string())),
        ]
    );
    // 复制的接口按自身步骤解析文件
    assert!(compiled.meta.file_resource_ids.contains("copy"));
}

#[tokio::test]
async fn test_sub_scenario_gets_its_own_environment() {
    let blobs = InMemoryBlobStore::new()
        .with_blob(
            ResourceKind::Scenario,
            "scenario-b",
            json!({ "environmentId": "group-1", "grouped": true, "config": {} }).to_string(),
        )
        .with_blob(ResourceKind::Step, "inner", http("GET", "/inner"));
    let environments = InMemoryEnvironmentService::new()
        .with_environment(env("env-root", "project-1"))
        .with_environment(env("env-p1", "project-1"))
        .with_environment(env("env-p2", "project-2"))
        .with_group("group-1", vec!["env-p1".to_string(), "env-p2".to_string()]);
    let f = fixture_with(blobs, environments, InMemoryDefinitionCatalog::new());

    let mut steps = vec![StepNode::new("sub", StepType::ApiScenario)
        .with_ref(RefType::FullRef, "scenario-b")
        .with_project("project-2")
        .with_children(vec![StepNode::new("inner", StepType::CustomRequest)])];
    let context = CompileContext {
        environment_id: Some("env-root".to_string()),
        ..Default::default()
    };

    let compiled = f.compiler.compile(&root(), &mut steps, &context).await.unwrap();

    match &compiled.root.body {
        ElementBody::Scenario(ScenarioBody {
            environment: Some(EnvBinding::Single { environment }),
            ..
        }) => assert_eq!(environment.id, "env-root"),
        other => panic!("unexpected root body: {:?}", other),
    }

    let sub = &compiled.root.children[0];
    match &sub.body {
        ElementBody::Scenario(ScenarioBody {
            environment: Some(EnvBinding::Group { project_env_map, .. }),
            ..
        }) => {
            assert_eq!(project_env_map["project-1"].id, "env-p1");
            assert_eq!(project_env_map["project-2"].id, "env-p2");
        }
        other => panic!("unexpected sub body: {:?}", other),
    }

    assert!(compiled.meta.file_resource_ids.contains("scenario-b"));
    assert_eq!(
        compiled.meta.file_step_scenario_map.get("inner").map(String::as_str),
        Some("scenario-b")
    );
    assert!(compiled.meta.ref_project_ids.contains("project-2"));
}

#[tokio::test]
async fn test_partial_ref_enable_map_applied_before_counting() {
    let blobs = InMemoryBlobStore::new()
        .with_blob(ResourceKind::Scenario, "scenario-b", "{}")
        .with_blob(ResourceKind::Step, "partial", r#"{"x1":false}"#)
        .with_blob(ResourceKind::Step, "x1", http("GET", "/x1"))
        .with_blob(ResourceKind::Step, "x2", http("GET", "/x2"));
    let f = fixture(blobs);

    let mut steps = vec![StepNode::new("partial", StepType::ApiScenario)
        .with_ref(RefType::PartialRef, "scenario-b")
        .with_children(vec![
            StepNode::new("x1", StepType::CustomRequest),
            StepNode::new("x2", StepType::CustomRequest),
        ])];

    let compiled = f
        .compiler
        .compile(&root(), &mut steps, &CompileContext::default())
        .await
        .unwrap();

    assert_eq!(compiled.meta.request_count, 1);
    assert_eq!(compiled.root.children[0].children.len(), 1);
    assert!(!steps[0].children[0].enabled);
}

#[tokio::test]
async fn test_ad_hoc_details_override_persisted() {
    let blobs = InMemoryBlobStore::new().with_blob(ResourceKind::Step, "s1", http("GET", "/saved"));
    let f = fixture(blobs);

    let mut context = CompileContext::default();
    context
        .step_details
        .insert("s1".to_string(), json!({ "method": "POST", "path": "/edited" }));

    let mut steps = vec![StepNode::new("s1", StepType::CustomRequest)];
    let compiled = f.compiler.compile(&root(), &mut steps, &context).await.unwrap();

    match &compiled.root.children[0].body {
        ElementBody::Http(http) => assert_eq!(http.path, "/edited"),
        other => panic!("unexpected body: {:?}", other),
    }
    assert_eq!(f.blobs.fetch_count(), 0);
}

#[tokio::test]
async fn test_standalone_request_count_matches_compiled() {
    let blobs = InMemoryBlobStore::new()
        .with_blob(ResourceKind::Step, "a", http("GET", "/a"))
        .with_blob(ResourceKind::Step, "b", http("GET", "/b"));
    let f = fixture(blobs);

    let mut steps = vec![
        StepNode::new("a", StepType::CustomRequest),
        StepNode::new("loop", StepType::LoopController)
            .with_children(vec![StepNode::new("b", StepType::CustomRequest)]),
        StepNode::new("c", StepType::CustomRequest).disabled(),
    ];

    let compiled = f
        .compiler
        .compile(&root(), &mut steps, &CompileContext::default())
        .await
        .unwrap();
    assert_eq!(compiled.meta.request_count, request_count(&steps));
    assert_eq!(compiled.meta.request_count, 2);
}

#[tokio::test]
async fn test_corrupted_request_counted_only_in_tree_count() {
    let blobs = InMemoryBlobStore::new()
        .with_blob(ResourceKind::Step, "bad", "{broken")
        .with_blob(ResourceKind::Step, "good", http("GET", "/ok"));
    let f = fixture(blobs);

    let mut steps = vec![
        StepNode::new("bad", StepType::CustomRequest),
        StepNode::new("good", StepType::CustomRequest),
    ];
    let compiled = f
        .compiler
        .compile(&root(), &mut steps, &CompileContext::default())
        .await
        .unwrap();

    assert_eq!(request_count(&steps), 2);
    assert_eq!(compiled.meta.request_count, 1);
}
