mod common;

use serde_json::json;

use common::{ctx, Harness};
use uptime_application::TaskBrief;
use uptime_domain::UptimeCheckError;

async fn create_task(harness: &Harness, name: &str) -> i64 {
    harness
        .task_service()
        .create(
            &ctx(),
            &json!({
                "name": name,
                "protocol": "ICMP",
                "config": {"period": 60, "ip_list": ["10.0.0.1"]}
            }),
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_create_group_keeps_task_order() {
    let harness = Harness::new();
    let a = create_task(&harness, "a").await;
    let b = create_task(&harness, "b").await;

    let group = harness
        .group_service()
        .create(
            &ctx(),
            &json!({"name": "core", "logo": "data:image/png;base64,", "task_id_list": [b, a]}),
        )
        .await
        .unwrap();
    assert_eq!(group.bk_biz_id, 2);
    assert_eq!(
        group.tasks,
        vec![
            TaskBrief {
                id: b,
                name: "b".to_string()
            },
            TaskBrief {
                id: a,
                name: "a".to_string()
            },
        ]
    );

    // 任务侧反查到所属分组
    let detail = harness.task_service().retrieve(&ctx(), a).await.unwrap();
    assert_eq!(detail.task.group_ids, vec![group.id]);
}

#[tokio::test]
async fn test_create_requires_task_id_list() {
    let harness = Harness::new();
    let err = harness
        .group_service()
        .create(&ctx(), &json!({"name": "core"}))
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("task_id_list"));
}

#[tokio::test]
async fn test_group_name_unique_and_length_limited() {
    let harness = Harness::new();
    let groups = harness.group_service();
    groups
        .create(&ctx(), &json!({"name": "core", "task_id_list": []}))
        .await
        .unwrap();

    let err = groups
        .create(&ctx(), &json!({"name": "core", "task_id_list": []}))
        .await
        .unwrap_err();
    assert!(matches!(err, UptimeCheckError::DuplicateName { .. }));

    let err = groups
        .create(&ctx(), &json!({"name": "x".repeat(51), "task_id_list": []}))
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("name"));

    // 其他业务可以使用相同名称
    assert!(groups
        .create(&ctx().for_biz(3), &json!({"name": "core", "task_id_list": []}))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_update_without_task_list_keeps_members() {
    let harness = Harness::new();
    let a = create_task(&harness, "a").await;
    let groups = harness.group_service();
    let group = groups
        .create(&ctx(), &json!({"name": "core", "task_id_list": [a]}))
        .await
        .unwrap();

    let renamed = groups
        .update(&ctx(), group.id, &json!({"name": "edge"}))
        .await
        .unwrap();
    assert_eq!(renamed.name, "edge");
    assert_eq!(renamed.tasks.len(), 1);

    let emptied = groups
        .update(&ctx(), group.id, &json!({"task_id_list": []}))
        .await
        .unwrap();
    assert!(emptied.tasks.is_empty());
}

#[tokio::test]
async fn test_add_and_remove_task() {
    let harness = Harness::new();
    let a = create_task(&harness, "a").await;
    let groups = harness.group_service();
    let group = groups
        .create(&ctx(), &json!({"name": "core", "task_id_list": []}))
        .await
        .unwrap();

    assert!(groups.add_task(&ctx(), group.id, a).await.unwrap().changed);
    assert!(!groups.add_task(&ctx(), group.id, a).await.unwrap().changed);
    assert_eq!(
        harness.task_service().count(&ctx(), Some(group.id)).await.unwrap(),
        1
    );

    assert!(groups.remove_task(&ctx(), group.id, a).await.unwrap().changed);
    assert!(!groups.remove_task(&ctx(), group.id, a).await.unwrap().changed);

    let err = groups.add_task(&ctx(), group.id, 999).await.unwrap_err();
    assert!(matches!(err, UptimeCheckError::TaskNotFound { .. }));
}

#[tokio::test]
async fn test_deleted_tasks_hidden_from_group() {
    let harness = Harness::new();
    let a = create_task(&harness, "a").await;
    let b = create_task(&harness, "b").await;
    let groups = harness.group_service();
    let group = groups
        .create(&ctx(), &json!({"name": "core", "task_id_list": [a, b]}))
        .await
        .unwrap();

    // STARTING 状态需先停止才能删除
    let tasks = harness.task_service();
    tasks.change_status(&ctx(), a, "stoped").await.unwrap();
    tasks.destroy(&ctx(), a).await.unwrap();

    let detail = groups.retrieve(&ctx(), group.id).await.unwrap();
    let ids: Vec<i64> = detail.tasks.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![b]);
}

#[tokio::test]
async fn test_destroy_and_list() {
    let harness = Harness::new();
    let groups = harness.group_service();
    let first = groups
        .create(&ctx(), &json!({"name": "first", "task_id_list": []}))
        .await
        .unwrap();
    groups
        .create(&ctx(), &json!({"name": "second", "task_id_list": []}))
        .await
        .unwrap();

    groups.destroy(&ctx(), first.id).await.unwrap();
    let names: Vec<String> = groups
        .list(&ctx())
        .await
        .unwrap()
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(names, vec!["second"]);

    let err = groups.retrieve(&ctx(), first.id).await.unwrap_err();
    assert!(matches!(err, UptimeCheckError::GroupNotFound { .. }));
}
