//! Interface tests for the migration contract using Cucumber.
//!
//! Scenarios drive the orchestrator against the in-memory cluster:
//!
//! ```bash
//! cargo test --test interfaces
//! ```

mod steps;

use cucumber::World;
use steps::migration::MigrationWorld;

#[tokio::main]
async fn main() {
    println!("\n=== Running Migration Interface Tests ===\n");
    MigrationWorld::cucumber()
        .fail_on_skipped()
        .run_and_exit("tests/interfaces/features/migration.feature")
        .await;
}
