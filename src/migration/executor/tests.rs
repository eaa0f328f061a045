use crate::catalogue::IndexDefinition;
use crate::cluster::{ClusterAdmin, ClusterCall, MockClusterAdmin};

use super::*;

fn v1() -> IndexDefinition {
    IndexDefinition::new("domains", "v1", r#"{"settings":{"number_of_shards":1}}"#)
        .with_mapping("domain", r#"{"properties":{"id":{"type":"long"}}}"#)
}

fn v2() -> IndexDefinition {
    IndexDefinition::new("domains", "v2", r#"{"settings":{"number_of_shards":2}}"#)
        .with_mapping("domain", r#"{"properties":{"imageUrl":{"type":"string"}}}"#)
        .with_mapping("tag", "{}")
}

async fn live_v1(cluster: &MockClusterAdmin, documents: usize) {
    cluster.seed_index("domains_v1").await;
    cluster.seed_alias("domains", "domains_v1").await;
    for i in 1..=documents {
        cluster
            .seed_document(
                "domains_v1",
                "domain",
                &i.to_string(),
                &format!(r#"{{"id":{},"title":"t{}"}}"#, i, i),
            )
            .await;
    }
}

#[tokio::test]
async fn test_first_migration_creates_and_aliases() {
    let cluster = MockClusterAdmin::new();
    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());

    executor
        .execute(&Migration::new("domains", None, v1()))
        .await
        .unwrap();

    assert_eq!(cluster.index_names().await, vec!["domains_v1"]);
    assert_eq!(cluster.alias_targets("domains").await, vec!["domains_v1"]);
    assert_eq!(cluster.mapping_types("domains_v1").await, vec!["domain"]);
    assert_eq!(
        cluster.settings_of("domains_v1").await.as_deref(),
        Some(r#"{"settings":{"number_of_shards":1}}"#)
    );

    let calls = cluster.calls().await;
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::OpenScroll(_))));
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::DeleteIndex(_))));
    assert!(calls.contains(&ClusterCall::SwapAlias {
        alias: "domains".to_string(),
        add_to: "domains_v1".to_string(),
        remove_from: None,
    }));
}

#[tokio::test]
async fn test_chained_migration_copies_swaps_and_deletes() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 5).await;
    let before = cluster.documents("domains").await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap();

    assert_eq!(cluster.index_names().await, vec!["domains_v2"]);
    assert_eq!(cluster.alias_targets("domains").await, vec!["domains_v2"]);
    assert_eq!(cluster.mapping_types("domains_v2").await, vec!["domain", "tag"]);
    assert_eq!(cluster.documents("domains").await, before);
    assert_eq!(cluster.open_scrolls().await, 0);
}

#[tokio::test]
async fn test_phases_run_in_order() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 3).await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap();

    let writes = cluster.write_calls().await;
    assert_eq!(
        writes,
        vec![
            ClusterCall::CreateIndex("domains_v2".to_string()),
            ClusterCall::PutMapping {
                index: "domains_v2".to_string(),
                mapping_type: "domain".to_string(),
            },
            ClusterCall::PutMapping {
                index: "domains_v2".to_string(),
                mapping_type: "tag".to_string(),
            },
            ClusterCall::Bulk { items: 3 },
            ClusterCall::SwapAlias {
                alias: "domains".to_string(),
                add_to: "domains_v2".to_string(),
                remove_from: Some("domains_v1".to_string()),
            },
            ClusterCall::DeleteIndex("domains_v1".to_string()),
        ]
    );

    let calls = cluster.calls().await;
    let refresh = calls
        .iter()
        .position(|c| *c == ClusterCall::Refresh("domains_v2".to_string()))
        .unwrap();
    let bulk = calls.iter().position(|c| matches!(c, ClusterCall::Bulk { .. })).unwrap();
    let swap = calls
        .iter()
        .position(|c| matches!(c, ClusterCall::SwapAlias { .. }))
        .unwrap();
    assert!(bulk < refresh && refresh < swap);
}

#[tokio::test]
async fn test_scroll_pages_and_bulk_batches() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 25).await;

    let config = ExecutorConfig {
        scroll_page_size: 10,
        bulk_batch_size: 12,
        ..Default::default()
    };
    let executor = MigrationExecutor::new(&cluster, config);
    executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap();

    let calls = cluster.calls().await;
    let next_pages = calls
        .iter()
        .filter(|c| matches!(c, ClusterCall::NextScroll(_)))
        .count();
    // 10 + 10 + 5, then one empty page.
    assert_eq!(next_pages, 3);
    let batches: Vec<usize> = calls
        .iter()
        .filter_map(|c| match c {
            ClusterCall::Bulk { items } => Some(*items),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![12, 12, 1]);
    assert_eq!(cluster.documents("domains").await.len(), 25);
}

#[tokio::test]
async fn test_empty_source_skips_bulk() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 0).await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap();

    let calls = cluster.calls().await;
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::Bulk { .. })));
    assert_eq!(cluster.alias_targets("domains").await, vec!["domains_v2"]);
}

#[tokio::test]
async fn test_create_index_not_acknowledged() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 3).await;
    cluster.set_reject_create_index(true).await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    let err = executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::IndexCreationFailed { ref index, .. } if index == "domains_v2"));
    assert_eq!(err.phase(), Some(Phase::CreateIndex));
    assert_eq!(
        cluster.write_calls().await,
        vec![ClusterCall::CreateIndex("domains_v2".to_string())]
    );
    assert_eq!(cluster.alias_targets("domains").await, vec!["domains_v1"]);
}

#[tokio::test]
async fn test_mapping_not_acknowledged_names_type() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 3).await;
    cluster.set_reject_mapping(Some("tag")).await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    let err = executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::MappingCreationFailed { ref mapping_type, .. } if mapping_type == "tag"
    ));
    let calls = cluster.calls().await;
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::OpenScroll(_))));
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::SwapAlias { .. })));
}

#[tokio::test]
async fn test_missing_source_fails_bulk_precondition() {
    let cluster = MockClusterAdmin::new();

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    let err = executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::PreconditionFailed { phase: Phase::BulkCopy, ref index, .. } if index == "domains_v1"
    ));
    let calls = cluster.calls().await;
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::OpenScroll(_))));
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::Bulk { .. })));
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::SwapAlias { .. })));
}

#[tokio::test]
async fn test_bulk_failure_stops_before_swap() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 5).await;
    cluster.reject_bulk_id("3").await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    let err = executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap_err();

    match err {
        MigrationError::BulkCopyFailed {
            migration,
            failed,
            total,
            first_reason,
        } => {
            assert_eq!(migration.source.as_deref(), Some("domains_v1"));
            assert_eq!(migration.target, "domains_v2");
            assert_eq!(failed, 1);
            assert_eq!(total, 5);
            assert!(first_reason.contains("'3'"));
        }
        other => panic!("unexpected error: {}", other),
    }
    let calls = cluster.calls().await;
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::Refresh(_))));
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::SwapAlias { .. })));
    assert_eq!(cluster.alias_targets("domains").await, vec!["domains_v1"]);
}

#[tokio::test]
async fn test_alias_swap_not_acknowledged() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 2).await;
    cluster.set_reject_alias_swap(true).await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    let err = executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::AliasSwapFailed { .. }));
    assert_eq!(err.phase(), Some(Phase::AliasSwap));
    let calls = cluster.calls().await;
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::DeleteIndex(_))));
    assert!(cluster.index_names().await.contains(&"domains_v1".to_string()));
}

#[tokio::test]
async fn test_source_vanishing_mid_migration_fails_precondition() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 3).await;
    // Someone else deletes the source while the target is being created.
    cluster.delete_when_created("domains_v2", "domains_v1").await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    let err = executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::PreconditionFailed { phase: Phase::BulkCopy, ref index, .. } if index == "domains_v1"
    ));
}

#[tokio::test]
async fn test_delete_not_acknowledged_after_swap() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 2).await;
    cluster.set_reject_delete(true).await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    let err = executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::IndexDeletionFailed { ref index, .. } if index == "domains_v1"));
    // The alias has already moved; the old index is merely orphaned.
    assert_eq!(cluster.alias_targets("domains").await, vec!["domains_v2"]);
}

#[tokio::test]
async fn test_invalid_migration_touches_nothing() {
    let cluster = MockClusterAdmin::new();
    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());

    let err = executor
        .execute(&Migration::new("domains", Some(v1()), v1()))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::InvalidMigrationSpec { .. }));
    assert!(cluster.calls().await.is_empty());
}

#[tokio::test]
async fn test_transport_error_carries_phase() {
    let cluster = MockClusterAdmin::new();
    cluster.set_unavailable(true).await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    let err = executor
        .execute(&Migration::new("domains", None, v1()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::Cluster { phase: Phase::CreateIndex, .. }
    ));
}

#[tokio::test]
async fn test_delete_phase_tolerates_missing_source() {
    let cluster = MockClusterAdmin::new();
    cluster.seed_index("domains_v2").await;
    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());

    let label = Migration::new("domains", Some(v1()), v2()).label();
    executor.delete_source(&label).await.unwrap();

    assert!(!cluster
        .calls()
        .await
        .iter()
        .any(|c| matches!(c, ClusterCall::DeleteIndex(_))));
    assert!(cluster.index_exists("domains_v2").await.unwrap());
}

#[tokio::test]
async fn test_target_vanishing_after_copy_fails_swap_precondition() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 3).await;
    cluster.delete_when_refreshed("domains_v2").await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    let err = executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::PreconditionFailed { phase: Phase::AliasSwap, ref index, .. } if index == "domains_v2"
    ));
    let calls = cluster.calls().await;
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::SwapAlias { .. })));
    assert_eq!(cluster.alias_targets("domains").await, vec!["domains_v1"]);
}

#[tokio::test]
async fn test_source_vanishing_after_copy_fails_swap_precondition() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 3).await;
    cluster.delete_when_refreshed("domains_v1").await;

    let executor = MigrationExecutor::new(&cluster, ExecutorConfig::default());
    let err = executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::PreconditionFailed { phase: Phase::AliasSwap, ref index, .. } if index == "domains_v1"
    ));
    let calls = cluster.calls().await;
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::SwapAlias { .. })));
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::DeleteIndex(_))));
}

#[tokio::test]
async fn test_scroll_failure_still_clears_scroll() {
    let cluster = MockClusterAdmin::new();
    live_v1(&cluster, 25).await;
    cluster.set_fail_next_scroll(true).await;

    let config = ExecutorConfig {
        scroll_page_size: 10,
        ..Default::default()
    };
    let executor = MigrationExecutor::new(&cluster, config);
    let err = executor
        .execute(&Migration::new("domains", Some(v1()), v2()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::Cluster { phase: Phase::BulkCopy, .. }
    ));
    let calls = cluster.calls().await;
    assert!(calls.iter().any(|c| matches!(c, ClusterCall::ClearScroll(_))));
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::Bulk { .. })));
    assert_eq!(cluster.open_scrolls().await, 0);
    assert_eq!(cluster.alias_targets("domains").await, vec!["domains_v1"]);
}
