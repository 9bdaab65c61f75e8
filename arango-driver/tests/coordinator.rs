// SPDX-License-Identifier: PMPL-1.0-or-later
//! End-to-end tests against an in-process mock coordinator, exercising the
//! real HTTP transport: document round trips, batched cursors, structured
//! errors and leader failover.

use serde_json::json;

use arango_driver::{AqlQuery, ConnectionOptions, Database, DriverError};
use mock_arango::MockServer;

fn system_db(server: &MockServer) -> Database {
    Database::new(ConnectionOptions {
        urls: vec![server.url()],
        ..ConnectionOptions::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_version_over_real_http() {
    let server = MockServer::start().await.unwrap();
    let db = system_db(&server);

    let version = db.version().await.unwrap();

    assert_eq!(version.server, "arango");
    assert_eq!(version.version, "3.11.0");
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_collection_and_document_round_trip() {
    let server = MockServer::start().await.unwrap();
    let db = system_db(&server);
    let users = db.collection("users");

    let info = users.create().await.unwrap();
    assert_eq!(info.name, "users");
    assert_eq!(info.kind, 2);
    assert_eq!(users.count().await.unwrap(), 0);

    let meta = users
        .save(json!({"_key": "ada", "name": "Ada"}))
        .await
        .unwrap();
    assert_eq!(meta.id, "users/ada");
    assert_eq!(users.count().await.unwrap(), 1);

    users.update("ada", json!({"age": 36})).await.unwrap();
    let doc = users.document("ada").await.unwrap();
    assert_eq!(doc["name"], "Ada");
    assert_eq!(doc["age"], 36);

    users.replace("ada", json!({"handle": "countess"})).await.unwrap();
    let doc = users.document("users/ada").await.unwrap();
    assert_eq!(doc["handle"], "countess");
    assert!(doc.get("name").is_none());

    users.remove("ada").await.unwrap();
    assert_eq!(users.count().await.unwrap(), 0);
    users.drop().await.unwrap();
}

#[tokio::test]
async fn test_cursor_drains_across_batches() {
    let server = MockServer::start().await.unwrap();
    let db = system_db(&server);

    let mut cursor = db
        .query(
            AqlQuery::new("FOR i IN 1..10 RETURN i")
                .with_batch_size(3)
                .with_count(),
        )
        .await
        .unwrap();

    assert_eq!(cursor.count(), Some(10));
    let rows = cursor.all().await.unwrap();
    assert_eq!(rows, (1..=10).map(|n| json!(n)).collect::<Vec<_>>());
    assert!(!cursor.has_next());
    // One create plus three continuation fetches.
    assert_eq!(server.request_count(), 4);
}

#[tokio::test]
async fn test_cursor_kill_discards_the_server_cursor() {
    let server = MockServer::start().await.unwrap();
    let db = system_db(&server);

    let mut cursor = db
        .query(AqlQuery::new("FOR i IN 1..10 RETURN i").with_batch_size(4))
        .await
        .unwrap();
    cursor.kill().await.unwrap();
    assert_eq!(server.request_count(), 2);

    // The first batch stays readable; nothing further is fetched.
    let mut rows = Vec::new();
    while let Some(row) = cursor.next().await.unwrap() {
        rows.push(row);
    }
    assert_eq!(rows, vec![json!(1), json!(2), json!(3), json!(4)]);
    cursor.kill().await.unwrap();
    assert_eq!(server.request_count(), 2);
}

#[tokio::test]
async fn test_query_results_come_back_in_key_order() {
    let server = MockServer::start().await.unwrap();
    let db = system_db(&server);
    let users = db.collection("users");
    users.create().await.unwrap();
    users.save(json!({"_key": "b", "name": "B"})).await.unwrap();
    users.save(json!({"_key": "a", "name": "A"})).await.unwrap();

    let mut cursor = db.query(AqlQuery::new("FOR u IN users RETURN u")).await.unwrap();
    let rows = cursor.all().await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "A");
    assert_eq!(rows[1]["name"], "B");
}

#[tokio::test]
async fn test_structured_errors_carry_the_server_error_num() {
    let server = MockServer::start().await.unwrap();
    let db = system_db(&server);

    let error = db.collection("missing").get().await.unwrap_err();
    assert!(matches!(error, DriverError::Arango { .. }));
    assert_eq!(error.error_num(), Some(1203));
    assert_eq!(error.http_status(), Some(404));

    let users = db.collection("users");
    users.create().await.unwrap();
    let error = users.document("nobody").await.unwrap_err();
    assert_eq!(error.error_num(), Some(1202));

    let error = db
        .query(AqlQuery::new("INSERT {} INTO users"))
        .await
        .unwrap_err();
    assert_eq!(error.error_num(), Some(1501));
}

#[tokio::test]
async fn test_duplicate_keys_are_a_conflict() {
    let server = MockServer::start().await.unwrap();
    let db = system_db(&server);
    let users = db.collection("users");
    users.create().await.unwrap();

    users.save(json!({"_key": "ada"})).await.unwrap();
    let error = users.save(json!({"_key": "ada"})).await.unwrap_err();

    assert_eq!(error.error_num(), Some(1210));
    assert_eq!(error.http_status(), Some(409));
}

#[tokio::test]
async fn test_unknown_paths_surface_as_not_found() {
    let server = MockServer::start().await.unwrap();
    let db = system_db(&server);

    let error = db.route("/no-such-service").get("thing").await.unwrap_err();

    assert_eq!(error.http_status(), Some(404));
}

#[tokio::test]
async fn test_leader_redirect_follows_to_the_new_coordinator() {
    let follower = MockServer::start().await.unwrap();
    let leader = MockServer::start().await.unwrap();
    follower.set_leader(&leader.url());
    let db = system_db(&follower);

    // The 503 from the follower is absorbed; the answer comes from the
    // leader it named.
    let version = db.version().await.unwrap();
    assert_eq!(version.server, "arango");
    assert_eq!(
        db.connection().host_urls().await,
        vec![follower.url(), leader.url()]
    );
    assert_eq!(follower.request_count(), 1);
    assert_eq!(leader.request_count(), 1);

    // The active host moved, so the follower sees no further traffic.
    db.version().await.unwrap();
    assert_eq!(follower.request_count(), 1);
    assert_eq!(leader.request_count(), 2);
}

#[tokio::test]
async fn test_acquire_host_list_registers_advertised_endpoints() {
    let server = MockServer::start().await.unwrap();
    let advertised = server.url();
    server.set_endpoints(&[&advertised, "tcp://127.0.0.1:1"]);
    let db = system_db(&server);

    let indices = db.acquire_host_list().await.unwrap();

    assert_eq!(indices, vec![0, 1]);
    assert_eq!(
        db.connection().host_urls().await,
        vec![server.url(), "http://127.0.0.1:1".to_string()]
    );
}
