use std::time::Duration;

use serde_json::json;

use mnemo_config::KvBackend;
use mnemo_storage::{db::Db, kv::KvStore};
use mnemo_testkit::TestDatabase;

async fn connect(db: &TestDatabase) -> KvStore {
	let cfg = KvBackend { dsn: db.dsn().to_string(), pool_max_conns: 1, timeout_ms: None };
	let conn = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	conn.ensure_schema().await.expect("Failed to ensure schema.");
	conn.ensure_schema().await.expect("Schema bootstrap must be idempotent.");

	KvStore::new(conn.pool)
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MNEMO_PG_DSN to run."]
async fn put_get_and_scan_round_trip() {
	let Some(base_dsn) = mnemo_testkit::env_dsn() else {
		eprintln!("Skipping put_get_and_scan_round_trip; set MNEMO_PG_DSN to run this test.");

		return;
	};
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let store = connect(&db).await;

	store.put("item:a", &json!({ "id": "a", "text": "first" }), None).await.expect("Put failed.");
	store.put("item:b", &json!({ "id": "b", "text": "second" }), None).await.expect("Put failed.");
	store.put("item:a", &json!({ "id": "a", "text": "updated" }), None).await.expect("Put failed.");
	store.put("other:c", &json!({ "id": "c" }), None).await.expect("Put failed.");

	let value = store.get("item:a").await.expect("Get failed.");

	assert_eq!(value, Some(json!({ "id": "a", "text": "updated" })));
	assert_eq!(store.get("item:missing").await.expect("Get failed."), None);

	let entries = store.scan("item:", 10).await.expect("Scan failed.");
	let keys = entries.iter().map(|entry| entry.key.as_str()).collect::<Vec<_>>();

	assert_eq!(keys, vec!["item:a", "item:b"]);
	assert_eq!(store.scan("item:", 1).await.expect("Scan failed.").len(), 1);

	db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MNEMO_PG_DSN to run."]
async fn expired_entries_are_invisible() {
	let Some(base_dsn) = mnemo_testkit::env_dsn() else {
		eprintln!("Skipping expired_entries_are_invisible; set MNEMO_PG_DSN to run this test.");

		return;
	};
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let store = connect(&db).await;

	store
		.put("cache:search:x", &json!({ "success": true }), Some(Duration::from_millis(1)))
		.await
		.expect("Put failed.");

	tokio::time::sleep(Duration::from_millis(20)).await;

	assert_eq!(store.get("cache:search:x").await.expect("Get failed."), None);
	assert!(store.scan("cache:", 10).await.expect("Scan failed.").is_empty());

	db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MNEMO_PG_DSN to run."]
async fn like_wildcards_in_prefix_are_literal() {
	let Some(base_dsn) = mnemo_testkit::env_dsn() else {
		eprintln!("Skipping like_wildcards_in_prefix_are_literal; set MNEMO_PG_DSN to run this test.");

		return;
	};
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let store = connect(&db).await;

	store.put("key:100%", &json!("literal"), None).await.expect("Put failed.");
	store.put("key:1000", &json!("other"), None).await.expect("Put failed.");

	let entries = store.scan("key:100%", 10).await.expect("Scan failed.");

	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].key, "key:100%");

	db.cleanup().await.expect("Failed to cleanup test database.");
}
