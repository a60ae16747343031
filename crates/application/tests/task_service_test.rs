mod common;

use serde_json::json;
use std::time::Duration;

use common::{ctx, Harness};
use uptime_application::{PlainTask, TaskQuery};
use uptime_domain::entities::{TaskFilter, TaskStatus};
use uptime_domain::ports::{ControlAction, PermissionAction};
use uptime_domain::repositories::{NodeRepository, TaskRepository};
use uptime_domain::UptimeCheckError;
use uptime_testing_utils::{
    host_record, MockAgentController, MockAuthorizer, MockHostDirectory, MockHostResolver,
    NodeBuilder, TaskBuilder,
};

fn icmp_payload(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "protocol": "ICMP",
        "config": {"period": 60, "ip_list": ["10.0.0.1"]}
    })
}

#[tokio::test]
async fn test_create_task_defaults() {
    let harness = Harness::new();
    let service = harness.task_service();

    let task = service.create(&ctx(), &icmp_payload("probe")).await.unwrap();
    assert!(task.id > 0);
    assert_eq!(task.status, TaskStatus::Starting);
    assert_eq!(task.check_interval, 60);
    assert_eq!(task.create_user, "admin");
    assert!(!task.independent_dataid);
}

#[tokio::test]
async fn test_create_rejects_short_period() {
    let harness = Harness::new();
    let service = harness.task_service();

    let err = service
        .create(
            &ctx(),
            &json!({
                "name": "probe",
                "protocol": "TCP",
                "config": {"period": 5, "port": 80, "ip_list": ["10.0.0.1"]}
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("period"));
}

#[tokio::test]
async fn test_create_duplicate_name_rejected() {
    let harness = Harness::new();
    let service = harness.task_service();

    service.create(&ctx(), &icmp_payload("probe")).await.unwrap();
    let err = service
        .create(&ctx(), &icmp_payload("probe"))
        .await
        .unwrap_err();
    assert!(matches!(err, UptimeCheckError::DuplicateName { .. }));

    assert!(service.name_conflicts(&ctx(), "probe", None).await.unwrap());
    assert!(!service.name_conflicts(&ctx(), "other", None).await.unwrap());
}

#[tokio::test]
async fn test_multi_tenant_forces_independent_dataid() {
    let mut harness = Harness::new();
    harness.config.multi_tenant_mode = true;
    let service = harness.task_service();

    let task = service.create(&ctx(), &icmp_payload("probe")).await.unwrap();
    assert!(task.independent_dataid);
}

#[tokio::test]
async fn test_create_with_misspelled_dataid_flag() {
    let harness = Harness::new();
    let service = harness.task_service();

    let mut payload = icmp_payload("probe");
    payload["indepentent_dataid"] = json!(true);
    let task = service.create(&ctx(), &payload).await.unwrap();
    assert!(task.independent_dataid);
}

#[tokio::test]
async fn test_public_node_requires_permission_when_enabled() {
    let mut harness = Harness::new();
    harness.config.enable_public_location_auth = true;
    harness.authorizer = MockAuthorizer::allow_all().deny(PermissionAction::UsePublicSyntheticLocation);

    let public = NodeRepository::save(
        &harness.store.node_repository(),
        &NodeBuilder::new().with_biz_id(5).common(vec![]).build(),
        "admin",
    )
    .await
    .unwrap();

    let service = harness.task_service();
    let mut payload = icmp_payload("probe");
    payload["node_id_list"] = json!([public.id]);

    let err = service.create(&ctx(), &payload).await.unwrap_err();
    assert!(matches!(err, UptimeCheckError::Authorization(_)));
    assert_eq!(
        harness.authorizer.checks(),
        vec![PermissionAction::UsePublicSyntheticLocation]
    );
}

#[tokio::test]
async fn test_public_node_allowed_when_auth_disabled() {
    let mut harness = Harness::new();
    harness.authorizer = MockAuthorizer::allow_all().deny(PermissionAction::UsePublicSyntheticLocation);
    let public = NodeRepository::save(
        &harness.store.node_repository(),
        &NodeBuilder::new().with_biz_id(5).common(vec![]).build(),
        "admin",
    )
    .await
    .unwrap();

    let service = harness.task_service();
    let mut payload = icmp_payload("probe");
    payload["node_ids"] = json!([{"id": public.id}]);

    let task = service.create(&ctx(), &payload).await.unwrap();
    assert_eq!(task.node_ids, vec![public.id]);
    assert!(harness.authorizer.checks().is_empty());
}

#[tokio::test]
async fn test_retrieve_resolves_targets_and_relations() {
    let mut harness = Harness::new();
    harness.resolver = MockHostResolver::new(vec!["10.0.0.5"]);
    let service = harness.task_service();

    let group = harness
        .group_service()
        .create(&ctx(), &json!({"name": "core", "task_id_list": []}))
        .await
        .unwrap();
    let task = service
        .create(
            &ctx(),
            &json!({
                "name": "dns",
                "protocol": "UDP",
                "group_id_list": [group.id],
                "config": {
                    "period": 60,
                    "port": 53,
                    "request": "",
                    "node_list": [{"bk_host_id": 1}],
                    "ip_list": ["10.0.0.1"]
                }
            }),
        )
        .await
        .unwrap();

    let detail = service.retrieve(&ctx(), task.id).await.unwrap();
    assert_eq!(detail.url, vec!["[10.0.0.5]:53", "[10.0.0.1]:53"]);
    assert_eq!(detail.groups.len(), 1);
    assert_eq!(detail.task.group_ids, vec![group.id]);

    let calls = harness.resolver.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, harness.config.default_output_fields);
}

#[tokio::test]
async fn test_retrieve_upgrades_legacy_hosts() {
    let mut harness = Harness::new();
    harness.directory = MockHostDirectory::with_hosts(vec![host_record(42, "10.0.0.1", 0)]);

    let repo = harness.store.task_repository();
    let stored = repo
        .save(
            &TaskBuilder::new()
                .with_config(json!({
                    "period": 60,
                    "hosts": [{"ip": "10.0.0.1", "bk_cloud_id": 0}]
                }))
                .build(),
            "admin",
        )
        .await
        .unwrap();

    let detail = harness
        .task_service()
        .retrieve(&ctx(), stored.id)
        .await
        .unwrap();
    assert_eq!(detail.url, vec!["10.0.0.1"]);
    assert!(detail.task.config.hosts.is_empty());
    assert_eq!(detail.task.config.node_list[0].bk_host_id, Some(42));
    assert_eq!(harness.directory.ip_queries(), vec![vec!["10.0.0.1".to_string()]]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_host_resolution_times_out() {
    let mut harness = Harness::new();
    harness.resolver = MockHostResolver::new(vec!["10.0.0.5"]).with_delay(Duration::from_secs(30));
    let service = harness.task_service();

    let task = service
        .create(
            &ctx(),
            &json!({
                "name": "ping",
                "protocol": "ICMP",
                "config": {"period": 60, "node_list": [{"bk_host_id": 1}]}
            }),
        )
        .await
        .unwrap();

    let err = service.retrieve(&ctx(), task.id).await.unwrap_err();
    assert!(matches!(err, UptimeCheckError::Timeout(_)));
}

#[tokio::test]
async fn test_update_keeps_unset_fields() {
    let harness = Harness::new();
    let service = harness.task_service();
    let task = service.create(&ctx(), &icmp_payload("probe")).await.unwrap();

    let updated = service
        .update(
            &ctx(),
            task.id,
            &json!({"config": {"period": 120, "ip_list": ["::1"]}}),
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "probe");
    assert_eq!(updated.check_interval, 120);
    assert_eq!(
        updated.config.ip_list,
        vec!["0000:0000:0000:0000:0000:0000:0000:0001"]
    );
    assert_eq!(updated.status, TaskStatus::Starting);
}

#[tokio::test]
async fn test_update_to_existing_name_rejected() {
    let harness = Harness::new();
    let service = harness.task_service();
    service.create(&ctx(), &icmp_payload("a")).await.unwrap();
    let b = service.create(&ctx(), &icmp_payload("b")).await.unwrap();

    let err = service
        .update(&ctx(), b.id, &json!({"name": "a"}))
        .await
        .unwrap_err();
    assert!(matches!(err, UptimeCheckError::DuplicateName { .. }));

    // 自身名称不算冲突
    assert!(service.update(&ctx(), b.id, &json!({"name": "b"})).await.is_ok());
}

#[tokio::test]
async fn test_destroy_running_task_is_busy() {
    let harness = Harness::new();
    let service = harness.task_service();
    let task = service.create(&ctx(), &icmp_payload("probe")).await.unwrap();
    service.change_status(&ctx(), task.id, "running").await.unwrap();

    let err = service.destroy(&ctx(), task.id).await.unwrap_err();
    assert!(matches!(err, UptimeCheckError::TaskBusy { .. }));

    let stopped = service.change_status(&ctx(), task.id, "stoped").await.unwrap();
    assert_eq!(stopped.status, TaskStatus::Stopped);
    service.destroy(&ctx(), task.id).await.unwrap();

    let err = service.retrieve(&ctx(), task.id).await.unwrap_err();
    assert!(matches!(err, UptimeCheckError::TaskNotFound { .. }));

    // 软删除后名称可以复用
    assert!(service.create(&ctx(), &icmp_payload("probe")).await.is_ok());
}

#[tokio::test]
async fn test_change_status_maps_requested_status() {
    let harness = Harness::new();
    let service = harness.task_service();
    let task = service.create(&ctx(), &icmp_payload("probe")).await.unwrap();

    service.change_status(&ctx(), task.id, "running").await.unwrap();
    service.change_status(&ctx(), task.id, "start_failed").await.unwrap();
    service.change_status(&ctx(), task.id, "whatever").await.unwrap();

    let actions: Vec<ControlAction> = harness.agent.calls().into_iter().map(|(_, a)| a).collect();
    assert_eq!(
        actions,
        vec![ControlAction::Start, ControlAction::Stop, ControlAction::Stop]
    );

    let stored = harness
        .store
        .task_repository()
        .get("system", task.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TaskStatus::Stopped);
}

#[tokio::test]
async fn test_deploy_only_from_starting() {
    let harness = Harness::new();
    let service = harness.task_service();
    let task = service.create(&ctx(), &icmp_payload("probe")).await.unwrap();

    let change = service.deploy(&ctx(), task.id).await.unwrap();
    assert_eq!(change.status, TaskStatus::Running);

    let err = service.deploy(&ctx(), task.id).await.unwrap_err();
    assert!(matches!(err, UptimeCheckError::InvalidStatusTransition { .. }));
    assert_eq!(harness.agent.call_count(), 1);
}

#[tokio::test]
async fn test_running_status_includes_logs_on_failure() {
    let mut harness = Harness::new();
    harness.agent = MockAgentController::new()
        .with_outcome(ControlAction::Deploy, TaskStatus::StartFailed)
        .with_logs(vec!["collector exited"]);
    let service = harness.task_service();
    let task = service.create(&ctx(), &icmp_payload("probe")).await.unwrap();

    let fresh = service.running_status(&ctx(), task.id).await.unwrap();
    assert_eq!(fresh.status, TaskStatus::Starting);
    assert!(fresh.error_log.is_none());

    service.deploy(&ctx(), task.id).await.unwrap();
    let failed = service.running_status(&ctx(), task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::StartFailed);
    assert_eq!(failed.error_log, Some(vec!["collector exited".to_string()]));
}

#[tokio::test]
async fn test_clone_picks_next_copy_name() {
    let harness = Harness::new();
    let service = harness.task_service();
    let source = service.create(&ctx(), &icmp_payload("probe")).await.unwrap();
    service
        .create(&ctx(), &icmp_payload("probe_copy"))
        .await
        .unwrap();

    let copy = service.clone_task(&ctx(), source.id).await.unwrap();
    assert_eq!(copy.name, "probe_copy(1)");
    assert_eq!(copy.status, TaskStatus::Starting);
    assert_eq!(copy.config, source.config);
    assert_ne!(copy.id, source.id);
}

#[tokio::test]
async fn test_list_ordering_and_group_filter() {
    let harness = Harness::new();
    let service = harness.task_service();
    let a = service.create(&ctx(), &icmp_payload("b-task")).await.unwrap();
    service.create(&ctx(), &icmp_payload("a-task")).await.unwrap();

    let by_name = service
        .list(
            &ctx(),
            &TaskQuery {
                ordering: Some("name".to_string()),
                ..TaskQuery::default()
            },
        )
        .await
        .unwrap();
    let names: Vec<&str> = by_name.iter().map(|s| s.task.name.as_str()).collect();
    assert_eq!(names, vec!["a-task", "b-task"]);
    assert_eq!(by_name[0].url, vec!["10.0.0.1"]);

    let group = harness
        .group_service()
        .create(&ctx(), &json!({"name": "g", "task_id_list": [a.id]}))
        .await
        .unwrap();
    let in_group = service
        .list(
            &ctx(),
            &TaskQuery {
                group_id: Some(group.id),
                ..TaskQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(in_group.len(), 1);
    assert_eq!(in_group[0].task.id, a.id);
    assert_eq!(service.count(&ctx(), None).await.unwrap(), 2);
    assert_eq!(service.count(&ctx(), Some(group.id)).await.unwrap(), 1);

    let err = service
        .list(
            &ctx(),
            &TaskQuery {
                ordering: Some("status".to_string()),
                ..TaskQuery::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("ordering"));
}

#[tokio::test]
async fn test_list_shows_start_failed_for_orphaned_nodes() {
    let harness = Harness::new();
    // 业务 9 不在业务目录中
    let orphan = NodeRepository::save(
        &harness.store.node_repository(),
        &NodeBuilder::new().with_biz_id(9).common(vec![]).build(),
        "admin",
    )
    .await
    .unwrap();

    let service = harness.task_service();
    let mut payload = icmp_payload("probe");
    payload["node_id_list"] = json!([orphan.id]);
    let task = service.create(&ctx(), &payload).await.unwrap();

    let summaries = service.list(&ctx(), &TaskQuery::default()).await.unwrap();
    assert_eq!(summaries[0].task.status, TaskStatus::StartFailed);
    assert_eq!(summaries[0].nodes.len(), 1);

    // 展示态不回写
    let stored = harness
        .store
        .task_repository()
        .list(&TaskFilter::for_biz("system", 2))
        .await
        .unwrap();
    assert_eq!(stored[0].id, task.id);
    assert_eq!(stored[0].status, TaskStatus::Starting);
}

#[tokio::test]
async fn test_list_plain_shapes() {
    let harness = Harness::new();
    let service = harness.task_service();
    let task = service.create(&ctx(), &icmp_payload("probe")).await.unwrap();

    let brief = service.list_plain(&ctx(), &TaskQuery::default()).await.unwrap();
    assert_eq!(
        brief,
        vec![PlainTask::Brief {
            id: task.id,
            name: "probe".to_string(),
            bk_biz_id: 2
        }]
    );

    let compact = service
        .list_plain(
            &ctx(),
            &TaskQuery {
                task_id: Some(task.id),
                ..TaskQuery::default()
            },
        )
        .await
        .unwrap();
    assert!(matches!(compact[0], PlainTask::Compact { .. }));
}

#[tokio::test]
async fn test_other_biz_cannot_see_task() {
    let harness = Harness::new();
    let service = harness.task_service();
    let task = service.create(&ctx(), &icmp_payload("probe")).await.unwrap();

    let err = service
        .retrieve(&ctx().for_biz(3), task.id)
        .await
        .unwrap_err();
    assert!(matches!(err, UptimeCheckError::TaskNotFound { .. }));
}
