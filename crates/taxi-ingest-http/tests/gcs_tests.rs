use taxi_ingest::{ObjectStore, ObjectStoreError, Provisioned};
use taxi_ingest_http::{GcsConfig, GcsObjectStore};
use wiremock::matchers::{body_bytes, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> GcsObjectStore {
    GcsObjectStore::new(GcsConfig {
        bucket: "zoomcamp-trips".into(),
        project: Some("taxi-project".into()),
        location: "US".into(),
        token: Some("secret-token".into()),
        api_base_url: Some(server.uri()),
    })
}

#[tokio::test]
async fn missing_bucket_is_created() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/zoomcamp-trips"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/storage/v1/b"))
        .and(query_param("project", "taxi-project"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_json(serde_json::json!({
            "name": "zoomcamp-trips",
            "location": "US",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "zoomcamp-trips"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert_eq!(store.ensure_bucket().await.unwrap(), Provisioned::Created);
}

#[tokio::test]
async fn existing_bucket_is_reused() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/zoomcamp-trips"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "zoomcamp-trips"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/storage/v1/b"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert_eq!(store.ensure_bucket().await.unwrap(), Provisioned::Existing);
}

#[tokio::test]
async fn forbidden_bucket_lookup_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/zoomcamp-trips"))
        .respond_with(ResponseTemplate::new(403).set_body_string("access denied"))
        .mount(&server)
        .await;

    let err = store_for(&server).bucket_exists().await.unwrap_err();
    match err {
        ObjectStoreError::Network(msg) => assert!(msg.contains("403"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn upload_posts_file_contents_under_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/zoomcamp-trips/o"))
        .and(query_param("uploadType", "media"))
        .and(query_param("name", "yellow_tripdata_2019-01.csv.gz"))
        .and(body_bytes(b"gzipped rows".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "yellow_tripdata_2019-01.csv.gz"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("yellow_tripdata_2019-01.csv.gz");
    std::fs::write(&local, b"gzipped rows").unwrap();

    store_for(&server)
        .upload(&local, "yellow_tripdata_2019-01.csv.gz")
        .await
        .unwrap();
}

#[tokio::test]
async fn list_follows_page_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/zoomcamp-trips/o"))
        .and(query_param("prefix", "yellow_tripdata_"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{ "name": "yellow_tripdata_2019-01.csv.gz" }]
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/zoomcamp-trips/o"))
        .and(query_param("prefix", "yellow_tripdata_"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{ "name": "yellow_tripdata_2019-02.csv.gz" }],
            "nextPageToken": "page-2"
        })))
        .mount(&server)
        .await;

    let keys = store_for(&server).list("yellow_tripdata_").await.unwrap();
    assert_eq!(
        keys,
        vec![
            "yellow_tripdata_2019-01.csv.gz",
            "yellow_tripdata_2019-02.csv.gz"
        ]
    );
}

#[tokio::test]
async fn empty_listing_has_no_items_field() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/zoomcamp-trips/o"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "kind": "storage#objects"
        })))
        .mount(&server)
        .await;

    let keys = store_for(&server).list("green_").await.unwrap();
    assert!(keys.is_empty());
}

#[tokio::test]
async fn download_reads_media() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/zoomcamp-trips/o/fhv_tripdata_2019-03.csv.gz"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"raw object".to_vec()))
        .mount(&server)
        .await;

    let body = store_for(&server)
        .download("fhv_tripdata_2019-03.csv.gz")
        .await
        .unwrap();
    assert_eq!(body, b"raw object");
}

#[tokio::test]
async fn download_of_missing_object_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/zoomcamp-trips/o/nope.csv.gz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = store_for(&server).download("nope.csv.gz").await.unwrap_err();
    assert!(matches!(err, ObjectStoreError::NotFound(_)));
}

#[tokio::test]
async fn uri_uses_gs_scheme() {
    let server = MockServer::start().await;
    let uri = store_for(&server).uri("yellow_tripdata_*.csv.gz").unwrap();
    assert_eq!(uri.to_string(), "gs://zoomcamp-trips/yellow_tripdata_*.csv.gz");
}
