//! Migration step definitions.

use std::sync::Arc;

use cucumber::{given, then, when, World};
use index_upgrader::catalogue::{Catalogue, IndexDefinition};
use index_upgrader::cluster::MockClusterAdmin;
use index_upgrader::migration::{MigrationError, MigrationOrchestrator, MigrationsApplied};

/// Test context for migration scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct MigrationWorld {
    cluster: Arc<MockClusterAdmin>,
    definitions: Vec<IndexDefinition>,
    applied: Option<MigrationsApplied>,
    last_error: Option<MigrationError>,
}

impl MigrationWorld {
    fn new() -> Self {
        Self {
            cluster: Arc::new(MockClusterAdmin::new()),
            definitions: Vec::new(),
            applied: None,
            last_error: None,
        }
    }

    fn applied(&self) -> &MigrationsApplied {
        match (&self.applied, &self.last_error) {
            (Some(applied), _) => applied,
            (None, Some(e)) => panic!("Migration run failed: {}", e),
            (None, None) => panic!("Migrations have not run"),
        }
    }
}

// --- Background ---

#[given("an empty cluster")]
async fn given_empty_cluster(world: &mut MigrationWorld) {
    world.cluster = Arc::new(MockClusterAdmin::new());
}

// --- Given steps ---

#[given(expr = "the catalogue declares {string} version {string} with type {string}")]
async fn given_catalogue_declares(
    world: &mut MigrationWorld,
    alias: String,
    version: String,
    mapping_type: String,
) {
    let mapping = format!(
        r#"{{"properties":{{"{}":{{"type":"string"}}}}}}"#,
        version
    );
    world.definitions.push(
        IndexDefinition::new(alias, version, r#"{"number_of_shards":1}"#)
            .with_mapping(mapping_type, mapping),
    );
}

#[given(expr = "index {string} is live behind alias {string} with {int} documents of type {string}")]
async fn given_live_index(
    world: &mut MigrationWorld,
    index: String,
    alias: String,
    count: u32,
    doc_type: String,
) {
    world.cluster.seed_index(&index).await;
    world.cluster.seed_alias(&alias, &index).await;
    for id in 1..=count {
        let source = format!(r#"{{"id":{},"title":"Document {}"}}"#, id, id);
        world
            .cluster
            .seed_document(&index, &doc_type, &id.to_string(), &source)
            .await;
    }
}

#[given("the cluster refuses to create indices")]
async fn given_reject_create(world: &mut MigrationWorld) {
    world.cluster.set_reject_create_index(true).await;
}

#[given("the cluster refuses to move aliases")]
async fn given_reject_alias_swap(world: &mut MigrationWorld) {
    world.cluster.set_reject_alias_swap(true).await;
}

#[given("the cluster refuses to delete indices")]
async fn given_reject_delete(world: &mut MigrationWorld) {
    world.cluster.set_reject_delete(true).await;
}

#[given(expr = "the cluster rejects document {string}")]
async fn given_reject_document(world: &mut MigrationWorld, id: String) {
    world.cluster.reject_bulk_id(&id).await;
}

// --- When steps ---

#[when("migrations run")]
async fn when_migrations_run(world: &mut MigrationWorld) {
    let catalogue = Catalogue::from_definitions(world.definitions.clone())
        .expect("Catalogue definitions should be unique");
    // Seeding happens outside the recorded call log.
    world.cluster.clear_calls().await;

    let orchestrator = MigrationOrchestrator::new(Arc::new(catalogue), world.cluster.clone());
    match orchestrator.migrate().await {
        Ok(applied) => {
            world.applied = Some(applied);
            world.last_error = None;
        }
        Err(e) => {
            world.applied = None;
            world.last_error = Some(e);
        }
    }
}

// --- Then steps ---

#[then(regex = r"^(\d+) migrations? (?:is|are) applied$")]
async fn then_count_applied(world: &mut MigrationWorld, count: usize) {
    assert_eq!(world.applied().len(), count);
}

#[then(expr = "the applied targets are {string}")]
async fn then_applied_targets(world: &mut MigrationWorld, targets: String) {
    let expected: Vec<&str> = targets.split(", ").collect();
    assert_eq!(world.applied().targets(), expected);
}

#[then(expr = "alias {string} points at {string}")]
async fn then_alias_points_at(world: &mut MigrationWorld, alias: String, index: String) {
    assert_eq!(world.cluster.alias_targets(&alias).await, vec![index]);
}

#[then(expr = "alias {string} serves {int} documents")]
async fn then_alias_serves(world: &mut MigrationWorld, alias: String, count: u32) {
    assert_eq!(world.cluster.documents(&alias).await.len(), count as usize);
}

#[then(expr = "index {string} exists")]
async fn then_index_exists(world: &mut MigrationWorld, index: String) {
    assert!(
        world.cluster.index_names().await.contains(&index),
        "Expected index '{}' to exist",
        index
    );
}

#[then(expr = "index {string} does not exist")]
async fn then_index_missing(world: &mut MigrationWorld, index: String) {
    assert!(
        !world.cluster.index_names().await.contains(&index),
        "Expected index '{}' to be gone",
        index
    );
}

#[then("no writes were made")]
async fn then_no_writes(world: &mut MigrationWorld) {
    assert!(world.cluster.write_calls().await.is_empty());
}

#[then(expr = "the run fails in phase {string}")]
async fn then_run_fails_in_phase(world: &mut MigrationWorld, phase: String) {
    let error = world
        .last_error
        .as_ref()
        .expect("Expected the migration run to fail");
    let actual = error
        .phase()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "none".to_string());
    assert_eq!(actual, phase, "Unexpected failure: {}", error);
}
