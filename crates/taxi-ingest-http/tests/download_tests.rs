use taxi_ingest::{Downloader, FetchError};
use taxi_ingest_http::HttpDownloader;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn download_writes_body_to_destination() {
    let server = MockServer::start().await;
    let body = b"VendorID,fare_amount\n1,7.5\n2,12.0\n".to_vec();

    Mock::given(method("GET"))
        .and(path("/yellow/yellow_tripdata_2019-01.csv.gz"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("yellow_tripdata_2019-01.csv.gz");
    let url = format!("{}/yellow/yellow_tripdata_2019-01.csv.gz", server.uri());

    let written = HttpDownloader::new().download(&url, &dest).await.unwrap();

    assert_eq!(written, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(!dir.path().join("yellow_tripdata_2019-01.csv.gz.part").exists());
}

#[tokio::test]
async fn missing_file_is_a_status_error_and_leaves_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fhv/fhv_tripdata_2031-01.csv.gz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("fhv_tripdata_2031-01.csv.gz");
    let url = format!("{}/fhv/fhv_tripdata_2031-01.csv.gz", server.uri());

    let err = HttpDownloader::new()
        .download(&url, &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert!(!dest.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn unreachable_host_is_a_network_error() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("green_tripdata_2020-01.csv.gz");

    let err = HttpDownloader::new()
        .download("http://127.0.0.1:1/green_tripdata_2020-01.csv.gz", &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Network(_)));
    assert!(!dest.exists());
}
