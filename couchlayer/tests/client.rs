use couchlayer::{
    memory::InMemoryTransport,
    prelude::*,
    transport::Method,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};

const DB: &str = "http://localhost:5984/users";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    name: String,
    age: u32,
}

impl Document for User {
    fn id(&self) -> &str {
        &self.id
    }

    fn revision(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    fn set_revision(&mut self, revision: Option<String>) {
        self.rev = revision;
    }
}

fn user(id: &str, age: u32) -> User {
    User {
        id: id.to_string(),
        rev: None,
        name: id.to_uppercase(),
        age,
    }
}

#[derive(Debug, Default)]
struct Recorder {
    events: Mutex<Vec<DatabaseEvent>>,
}

impl DatabaseListener for Recorder {
    fn database_changed(&self, event: &DatabaseEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

async fn setup() -> (InMemoryTransport, CouchClient) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let transport = InMemoryTransport::builder()
        .view("user-logic", "by-age", |doc| {
            vec![(doc["age"].clone(), Value::Null)]
        })
        .build()
        .await
        .unwrap();
    let client = CouchClient::new(transport.clone());
    client.create_database(DB).await.unwrap();

    (transport, client)
}

fn user_logic() -> DesignApplication {
    DesignApplication::new("user-logic")
        .with_view("by-age", "function(doc) { emit(doc.age, null); }")
}

#[tokio::test]
async fn stored_document_reads_back_with_its_revision() {
    let (_, client) = setup().await;

    let mut alice = user("alice", 30);
    assert!(client.store_one(&mut alice, DB, false).await.unwrap());

    let revision = alice.revision().unwrap().to_string();
    assert!(!revision.is_empty());

    let fetched: User = client.get_document("alice", DB).await.unwrap();
    assert_eq!(fetched, alice);
}

#[tokio::test]
async fn updating_with_current_revision_succeeds() {
    let (_, client) = setup().await;

    let mut alice = user("alice", 30);
    client.store_one(&mut alice, DB, false).await.unwrap();
    let first = alice.rev.clone();

    alice.age = 31;
    client.store_one(&mut alice, DB, false).await.unwrap();

    assert_ne!(alice.rev, first);
    let fetched: User = client.get_document("alice", DB).await.unwrap();
    assert_eq!(fetched.age, 31);
}

#[tokio::test]
async fn storing_with_a_stale_revision_conflicts() {
    let (_, client) = setup().await;

    let mut alice = user("alice", 30);
    client.store_one(&mut alice, DB, false).await.unwrap();
    let mut stale = alice.clone();
    client.store_one(&mut alice, DB, false).await.unwrap();

    let err = client.store_one(&mut stale, DB, false).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.status(), Some(409));
}

#[tokio::test]
async fn skip_if_exists_writes_only_once() {
    let (transport, client) = setup().await;

    let mut first = user("alice", 30);
    let mut second = user("alice", 99);
    assert!(client.store_one(&mut first, DB, true).await.unwrap());
    assert!(!client.store_one(&mut second, DB, true).await.unwrap());

    assert_eq!(transport.count_requests(Method::Post).await, 1);
    let fetched: User = client.get_document("alice", DB).await.unwrap();
    assert_eq!(fetched.age, 30);
}

#[tokio::test]
async fn batch_store_persists_every_document() {
    let (transport, client) = setup().await;

    let mut users: Vec<User> = (0..12).map(|i| user(&format!("user-{i}"), i)).collect();
    client.store_many(&mut users, DB, false, false).await.unwrap();

    assert_eq!(transport.document_count("users").await, Some(12));
    assert!(users.iter().all(|u| u.rev.is_some()));
}

#[tokio::test]
async fn batch_store_with_skip_if_exists_leaves_existing_documents() {
    let (transport, client) = setup().await;

    let mut existing = user("bob", 40);
    client.store_one(&mut existing, DB, false).await.unwrap();

    let mut users = vec![user("alice", 30), user("bob", 1), user("carol", 50)];
    client.store_many(&mut users, DB, true, false).await.unwrap();

    assert_eq!(transport.document_count("users").await, Some(3));
    assert!(users[1].rev.is_none());
    let bob: User = client.get_document("bob", DB).await.unwrap();
    assert_eq!(bob.age, 40);
}

#[tokio::test]
async fn conflicting_members_are_aggregated_into_one_error() {
    let (transport, client) = setup().await;

    let mut taken = vec![user("user-1", 1), user("user-3", 3)];
    client.store_many(&mut taken, DB, false, false).await.unwrap();

    let mut users: Vec<User> = (0..5).map(|i| user(&format!("user-{i}"), i + 10)).collect();
    let err = client
        .store_many(&mut users, DB, false, true)
        .await
        .unwrap_err();

    match err {
        CouchError::Batch(batch) => {
            assert_eq!(batch.len(), 2);
            assert!(batch.failures().iter().all(|failure| failure.is_conflict()));
        }
        other => panic!("expected a batch error, got {other:?}"),
    }

    assert_eq!(transport.document_count("users").await, Some(5));
    for (index, written) in users.iter().enumerate() {
        assert_eq!(written.rev.is_some(), index != 1 && index != 3, "user-{index}");
    }
}

#[tokio::test]
async fn delete_removes_existing_document() {
    let (transport, client) = setup().await;

    let mut alice = user("alice", 30);
    client.store_one(&mut alice, DB, false).await.unwrap();

    let mut reference = DocumentRef::new("alice");
    assert!(client.delete_one(&mut reference, DB).await.unwrap());
    assert_eq!(reference.revision(), alice.revision());

    assert!(!client.document_exists(&alice, DB).await.unwrap());
    assert_eq!(transport.document_count("users").await, Some(0));
}

#[tokio::test]
async fn deleting_an_absent_document_is_a_no_op() {
    let (transport, client) = setup().await;

    let mut ghost = user("ghost", 0);
    assert!(!client.delete_one(&mut ghost, DB).await.unwrap());
    assert_eq!(transport.count_requests(Method::Delete).await, 0);
}

#[tokio::test]
async fn batch_delete_skips_absent_documents() {
    let (transport, client) = setup().await;

    let mut users = vec![user("alice", 30), user("bob", 40)];
    client.store_many(&mut users, DB, false, false).await.unwrap();
    transport.clear_requests().await;

    let mut targets = vec![
        DocumentRef::new("alice"),
        DocumentRef::new("ghost"),
        DocumentRef::new("bob"),
    ];
    client.delete_many(&mut targets, DB, false).await.unwrap();

    assert_eq!(transport.count_requests(Method::Delete).await, 2);
    assert_eq!(transport.document_count("users").await, Some(0));
    assert!(targets[1].revision().is_none());
}

#[tokio::test]
async fn modify_runs_mixed_actions() {
    let (transport, client) = setup().await;

    let mut existing = vec![user("alice", 30), user("carol", 50)];
    client.store_many(&mut existing, DB, false, false).await.unwrap();

    let store = Action::store(&user("bob", 40), false).unwrap();
    let skipped_store = Action::store(&user("carol", 99), true).unwrap();
    let delete = Action::delete(&DocumentRef::new("alice"));
    let missing_delete = Action::delete(&DocumentRef::new("ghost"));
    let ids = [store.id(), skipped_store.id(), delete.id(), missing_delete.id()];

    let outcomes = client
        .modify(vec![store, skipped_store, delete, missing_delete], DB, false)
        .await
        .unwrap();

    assert!(matches!(outcomes[&ids[0]], ActionOutcome::Stored { .. }));
    assert!(matches!(outcomes[&ids[1]], ActionOutcome::Skipped { .. }));
    assert!(matches!(outcomes[&ids[2]], ActionOutcome::Deleted { .. }));
    assert!(matches!(outcomes[&ids[3]], ActionOutcome::Skipped { .. }));
    assert_eq!(transport.document_count("users").await, Some(2));

    let carol: User = client.get_document("carol", DB).await.unwrap();
    assert_eq!(carol.age, 50);
}

#[tokio::test]
async fn missing_document_is_not_found() {
    let (_, client) = setup().await;

    let err = client
        .get_document::<User>("nobody", DB)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let transport = InMemoryTransport::new();
    let client = CouchClient::new(transport.clone());
    let db = "http://localhost:5984/fresh";

    let mut app = user_logic();
    client.initialize(db, &mut app).await.unwrap();
    let installed = app.revision().map(str::to_string);
    assert!(installed.is_some());

    let mut again = user_logic();
    client.initialize(db, &mut again).await.unwrap();

    assert_eq!(transport.databases().await, vec!["fresh".to_string()]);
    assert_eq!(transport.document_count("fresh").await, Some(1));
    assert!(client.application_exists(db, "user-logic").await.unwrap());
    assert!(client.view_exists(db, "user-logic", "by-age").await.unwrap());
    assert!(!client.view_exists(db, "user-logic", "by-name").await.unwrap());
}

#[tokio::test]
async fn view_listing_returns_documents_in_key_order() {
    let (_, client) = setup().await;
    client.initialize(DB, &mut user_logic()).await.unwrap();

    let mut users = vec![user("carol", 50), user("alice", 30), user("bob", 40)];
    client.store_many(&mut users, DB, false, false).await.unwrap();

    let listed: Vec<User> = client
        .get_view_listing(&ViewRequest::new("user-logic", "by-age"), DB)
        .await
        .unwrap();
    let names: Vec<_> = listed.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(names, ["alice", "bob", "carol"]);

    let ranged: ViewResult = client
        .get_view(
            &ViewRequest::builder("user-logic", "by-age")
                .start_key(35)
                .limit(1)
                .build(),
            DB,
        )
        .await
        .unwrap();
    assert_eq!(ranged.rows.len(), 1);
    assert_eq!(ranged.rows[0].id.as_deref(), Some("bob"));
    assert_eq!(ranged.total_rows, Some(3));
}

#[tokio::test]
async fn change_feed_reports_writes_and_deletes() {
    let (_, client) = setup().await;

    let mut alice = user("alice", 30);
    client.store_one(&mut alice, DB, false).await.unwrap();
    let first = client.get_changes(DB, None).await.unwrap();
    assert_eq!(first.len(), 1);

    client.delete_one(&mut alice, DB).await.unwrap();
    let since = first.next_since();
    let next = client.get_changes(DB, since.as_deref()).await.unwrap();

    assert_eq!(next.len(), 1);
    assert_eq!(next.results[0].id, "alice");
    assert!(next.results[0].deleted);
}

#[tokio::test]
async fn lifecycle_events_reach_listeners() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let recorder = Arc::new(Recorder::default());
    let client = CouchClient::builder(InMemoryTransport::new())
        .listener(recorder.clone())
        .build();

    client.create_database(DB).await.unwrap();
    client.drop_database(DB).await.unwrap();
    client.drop_database(DB).await.unwrap();

    let kinds: Vec<_> = recorder
        .events
        .lock()
        .unwrap()
        .iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(kinds, [DatabaseEventKind::Created, DatabaseEventKind::Dropped]);
    assert!(!client.database_exists(DB).await.unwrap());
}

#[tokio::test]
async fn creating_an_existing_database_fails() {
    let (_, client) = setup().await;

    let err = client.create_database(DB).await.unwrap_err();
    assert_eq!(err.status(), Some(412));
}

#[tokio::test]
async fn requests_after_shutdown_fail() {
    let (_, client) = setup().await;
    client.shutdown().await.unwrap();

    let err = client.database_exists(DB).await.unwrap_err();
    assert!(matches!(err, CouchError::Closed));
}
