// file: tests/store_contract.rs
// description: behaviour every conditional store backend must share
// reference: run once against the memory backend and once against SQLite

use chrono::{Duration, Utc};
use deepwiki_store::database::sqlite::open_pool;
use deepwiki_store::{
    Changes, Condition, ConditionalStore, Key, MemoryStore, QueryRequest, Record, RequestContext,
    SqliteStore, StoreError, TableSchema,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

struct Backends {
    _dir: TempDir,
    pairs: Vec<(&'static str, Arc<dyn ConditionalStore>)>,
}

async fn backends(schema: TableSchema) -> Backends {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir.path().join("contract.db"), 2).await.unwrap();
    let sqlite = SqliteStore::new(pool, schema.clone()).await.unwrap();

    Backends {
        _dir: dir,
        pairs: vec![
            ("memory", Arc::new(MemoryStore::new(schema))),
            ("sqlite", Arc::new(sqlite)),
        ],
    }
}

#[tokio::test]
async fn put_respects_conditions() {
    let ctx = RequestContext::new();
    for (name, store) in backends(TableSchema::repositories("contract")).await.pairs {
        let first = record(json!({"repo_id": "repo-1", "status": "READY", "updated_at": "a"}));
        store.put(&ctx, first.clone(), Some(&Condition::NotExists)).await.unwrap();

        let again = store.put(&ctx, first.clone(), Some(&Condition::NotExists)).await;
        assert!(matches!(again, Err(StoreError::ConditionFailed)), "{}", name);

        let replaced = record(json!({"repo_id": "repo-1", "status": "FAILED", "updated_at": "b"}));
        let wrong = store
            .put(&ctx, replaced.clone(), Some(&Condition::equals("status", "PARSING")))
            .await;
        assert!(matches!(wrong, Err(StoreError::ConditionFailed)), "{}", name);
        store
            .put(&ctx, replaced.clone(), Some(&Condition::equals("status", "READY")))
            .await
            .unwrap();

        let stored = store.get(&ctx, &Key::partition("repo-1")).await.unwrap();
        assert_eq!(stored, Some(replaced), "{}", name);
    }
}

#[tokio::test]
async fn update_never_creates_and_keeps_state_on_failure() {
    let ctx = RequestContext::new();
    for (name, store) in backends(TableSchema::repositories("contract")).await.pairs {
        let key = Key::partition("repo-1");
        let changes = Changes::new().set("display_name", "Widgets");

        let missing = store.update(&ctx, &key, &changes, None).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))), "{}", name);
        let guarded = store.update(&ctx, &key, &changes, Some(&Condition::Exists)).await;
        assert!(matches!(guarded, Err(StoreError::ConditionFailed)), "{}", name);
        assert_eq!(store.get(&ctx, &key).await.unwrap(), None, "{}", name);

        let flagged = record(json!({
            "repo_id": "repo-1",
            "status": "READY",
            "updated_at": "a",
            "deleted": true,
            "note": "old"
        }));
        store.put(&ctx, flagged.clone(), None).await.unwrap();

        let live = Condition::Exists.and(Condition::not_equals("deleted", true));
        let refused = store.update(&ctx, &key, &changes, Some(&live)).await;
        assert!(matches!(refused, Err(StoreError::ConditionFailed)), "{}", name);
        assert_eq!(store.get(&ctx, &key).await.unwrap(), Some(flagged), "{}", name);

        let changes = Changes::new()
            .set("deleted", false)
            .set("metadata", json!({"stars": 3}))
            .remove("note");
        let updated = store.update(&ctx, &key, &changes, None).await.unwrap();
        assert_eq!(updated.get("deleted"), Some(&json!(false)), "{}", name);
        assert_eq!(updated.get("metadata"), Some(&json!({"stars": 3})), "{}", name);
        assert_eq!(updated.get("note"), None, "{}", name);
        assert_eq!(store.get(&ctx, &key).await.unwrap(), Some(updated), "{}", name);
    }
}

#[tokio::test]
async fn put_guard_allows_absent_or_same_owner() {
    let ctx = RequestContext::new();
    for (name, store) in backends(TableSchema::pages("contract")).await.pairs {
        let guard = |path: &str| Condition::NotExists.or(Condition::equals("source_path", path));
        let key = Key::composite("r", "p");

        let first = record(json!({"repo_id": "r", "page_id": "p", "source_path": "a.rs", "title": "A"}));
        store.put(&ctx, first, Some(&guard("a.rs"))).await.unwrap();

        let same = record(json!({"repo_id": "r", "page_id": "p", "source_path": "a.rs", "title": "A2"}));
        store.put(&ctx, same.clone(), Some(&guard("a.rs"))).await.unwrap();

        let foreign = record(json!({"repo_id": "r", "page_id": "p", "source_path": "b.rs", "title": "B"}));
        let refused = store.put(&ctx, foreign, Some(&guard("b.rs"))).await;
        assert!(matches!(refused, Err(StoreError::ConditionFailed)), "{}", name);
        assert_eq!(store.get(&ctx, &key).await.unwrap(), Some(same), "{}", name);
    }
}

#[tokio::test]
async fn key_attributes_are_immutable() {
    let ctx = RequestContext::new();
    for (name, store) in backends(TableSchema::pages("contract")).await.pairs {
        store
            .put(&ctx, record(json!({"repo_id": "r", "page_id": "p", "title": "T"})), None)
            .await
            .unwrap();
        let changes = Changes::new().set("page_id", "q");
        let result = store.update(&ctx, &Key::composite("r", "p"), &changes, None).await;
        assert!(matches!(result, Err(StoreError::InvalidRequest(_))), "{}", name);
    }
}

#[tokio::test]
async fn delete_semantics() {
    let ctx = RequestContext::new();
    for (name, store) in backends(TableSchema::repositories("contract")).await.pairs {
        let key = Key::partition("repo-9");
        store.delete(&ctx, &key, None).await.unwrap();
        let guarded = store.delete(&ctx, &key, Some(&Condition::Exists)).await;
        assert!(matches!(guarded, Err(StoreError::ConditionFailed)), "{}", name);

        store
            .put(&ctx, record(json!({"repo_id": "repo-9", "status": "READY", "updated_at": "a"})), None)
            .await
            .unwrap();
        let wrong = store
            .delete(&ctx, &key, Some(&Condition::equals("status", "FAILED")))
            .await;
        assert!(matches!(wrong, Err(StoreError::ConditionFailed)), "{}", name);
        store.delete(&ctx, &key, Some(&Condition::Exists)).await.unwrap();
        assert_eq!(store.get(&ctx, &key).await.unwrap(), None, "{}", name);
    }
}

#[tokio::test]
async fn index_query_orders_and_filters() {
    let ctx = RequestContext::new();
    for (name, store) in backends(TableSchema::repositories("contract")).await.pairs {
        for (id, status, updated, deleted) in [
            ("repo-a", "READY", "2024-01-01T00:00:00.000000Z", false),
            ("repo-b", "READY", "2024-03-01T00:00:00.000000Z", false),
            ("repo-c", "FAILED", "2024-02-01T00:00:00.000000Z", false),
            ("repo-d", "READY", "2024-02-01T00:00:00.000000Z", true),
        ] {
            let entry = json!({"repo_id": id, "status": status, "updated_at": updated, "deleted": deleted});
            store.put(&ctx, record(entry), None).await.unwrap();
        }

        let request = QueryRequest::new("READY")
            .on_index("status-index")
            .descending()
            .filter(Condition::not_equals("deleted", true));
        let ids: Vec<Value> = store
            .query(&ctx, &request)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.get("repo_id").cloned())
            .collect();
        assert_eq!(ids, vec![json!("repo-b"), json!("repo-a")], "{}", name);

        let limited = store.query(&ctx, &request.clone().limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1, "{}", name);

        let unknown = store
            .query(&ctx, &QueryRequest::new("READY").on_index("url-index"))
            .await;
        assert!(matches!(unknown, Err(StoreError::InvalidRequest(_))), "{}", name);
    }
}

#[tokio::test]
async fn scan_limit_applies_after_filter() {
    let ctx = RequestContext::new();
    for (name, store) in backends(TableSchema::repositories("contract")).await.pairs {
        for i in 0..6 {
            let entry = json!({
                "repo_id": format!("repo-{}", i),
                "status": "READY",
                "updated_at": "a",
                "provider": if i % 2 == 0 { "github" } else { "codecommit" }
            });
            store.put(&ctx, record(entry), None).await.unwrap();
        }

        let filter = Condition::equals("provider", "codecommit");
        let found = store.scan(&ctx, Some(&filter), Some(2)).await.unwrap();
        let ids: Vec<Value> = found.iter().filter_map(|r| r.get("repo_id").cloned()).collect();
        assert_eq!(ids, vec![json!("repo-1"), json!("repo-3")], "{}", name);

        let all = store.scan(&ctx, None, None).await.unwrap();
        assert_eq!(all.len(), 6, "{}", name);
    }
}

#[tokio::test]
async fn batch_write_reports_each_entry() {
    let ctx = RequestContext::new();
    for (name, store) in backends(TableSchema::pages("contract")).await.pairs {
        let puts = vec![
            record(json!({"repo_id": "r", "page_id": "p1", "title": "One"})),
            record(json!({"repo_id": "r", "page_id": "p2", "title": "Two"})),
            record(json!({"repo_id": "r", "title": "No sort key"})),
        ];
        let outcome = store.batch_write(&ctx, puts, Vec::new()).await.unwrap();
        assert_eq!(outcome.written, 2, "{}", name);
        assert_eq!(outcome.failures.len(), 1, "{}", name);
        assert!(!outcome.is_complete(), "{}", name);

        let outcome = store
            .batch_write(&ctx, Vec::new(), vec![Key::composite("r", "p1"), Key::composite("r", "p2")])
            .await
            .unwrap();
        assert_eq!(outcome.deleted, 2, "{}", name);
        assert!(store.query(&ctx, &QueryRequest::new("r")).await.unwrap().is_empty(), "{}", name);
    }
}

#[tokio::test]
async fn purge_expired_uses_ttl_attribute() {
    let ctx = RequestContext::new();
    for (name, store) in backends(TableSchema::jobs("contract")).await.pairs {
        let now = Utc::now();
        for (id, ttl) in [
            ("job-old", (now - Duration::hours(1)).timestamp()),
            ("job-new", (now + Duration::days(1)).timestamp()),
        ] {
            let entry = json!({"job_id": id, "repo_id": "r", "status": "RUNNING", "ttl": ttl});
            store.put(&ctx, record(entry), None).await.unwrap();
        }

        assert_eq!(store.purge_expired(&ctx, now).await.unwrap(), 1, "{}", name);
        assert_eq!(store.get(&ctx, &Key::partition("job-old")).await.unwrap(), None, "{}", name);
        assert!(store.get(&ctx, &Key::partition("job-new")).await.unwrap().is_some(), "{}", name);
    }
}

#[tokio::test]
async fn concurrent_creates_have_one_winner() {
    let ctx = RequestContext::new();
    for (name, store) in backends(TableSchema::repositories("contract")).await.pairs {
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                let entry = json!({"repo_id": "repo-race", "status": "READY", "updated_at": i.to_string()});
                store.put(&ctx, record(entry), Some(&Condition::NotExists)).await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => wins += 1,
                Err(StoreError::ConditionFailed) => {}
                Err(other) => panic!("{}: unexpected error {}", name, other),
            }
        }
        assert_eq!(wins, 1, "{}", name);
    }
}

#[tokio::test]
async fn cancelled_context_interrupts_calls() {
    for (name, store) in backends(TableSchema::repositories("contract")).await.pairs {
        let ctx = RequestContext::new();
        ctx.cancel();
        let result = store.get(&ctx, &Key::partition("repo-1")).await;
        assert!(matches!(result, Err(StoreError::Interrupted(_))), "{}", name);
    }
}
