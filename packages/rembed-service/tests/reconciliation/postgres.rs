use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use rembed_service::{CancelFlag, MemoryStore, PgMemoryStore, RembedService, SearchMode};
use rembed_storage::{db::Db, models::NewMemory, queries};
use rembed_testkit::TestDatabase;

use super::{ROOM, ScriptedProvider, seeded, test_config};

#[tokio::test]
#[ignore = "Requires external Postgres. Set REMBED_PG_DSN to run."]
async fn pgvector_rows_are_reconciled_end_to_end() {
	let Some(base_dsn) = rembed_testkit::env_dsn() else {
		eprintln!("Skipping pgvector_rows_are_reconciled_end_to_end; set REMBED_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let mut cfg = test_config(8);

	cfg.storage.postgres.dsn = test_db.dsn().to_string();

	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	for (i, dim) in [4_usize, 4, 16, 8].into_iter().enumerate() {
		let memory = NewMemory {
			id: Uuid::new_v4(),
			agent_id: "agent-alpha".to_string(),
			room_id: ROOM,
			content: json!({ "text": format!("stored memory {i}") }),
			embedding: Some(seeded(dim, i)),
		};

		queries::insert_memory(&db.pool, &memory).await.expect("Failed to insert memory.");
	}

	let pool = db.pool.clone();
	let store = Arc::new(PgMemoryStore::new(db));
	let provider =
		Arc::new(ScriptedProvider::new(Default::default(), |_| Ok(vec![0.125; 8])));
	let service = RembedService::new(cfg, store.clone(), provider, None);
	let report = service
		.reconciler()
		.run(&CancelFlag::new())
		.await
		.expect("Reconciliation should finish.");

	assert_eq!(report.discovered, 3);
	assert_eq!(report.succeeded_by_regeneration, 3);
	assert!(report.is_balanced());
	assert!(
		store.count_mismatched(8, &[]).await.expect("Discovery should succeed.").is_empty(),
		"Every row should now be at the target width."
	);

	let response =
		service.memory().search(ROOM, "stored memory", 10).await.expect("Search should answer.");

	assert_eq!(response.mode, SearchMode::Vector);
	assert_eq!(response.items.len(), 4);

	pool.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
