use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chunked_upload_server::config::UploadConfig;
use chunked_upload_server::services::completion::{CompletionResult, FnCompletion, StoreCompletion};
use chunked_upload_server::services::file_store::SqliteFileStore;
use chunked_upload_server::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

type Received = Arc<Mutex<Vec<(String, Vec<u8>)>>>;

fn test_config(tmp: &TempDir) -> UploadConfig {
    let mut config = UploadConfig::development();
    config.tmp_dir = tmp.path().join("plupload");
    config.storage_dir = tmp.path().join("storage");
    config.vary_by_session = true;
    config
}

/// App whose completion handler records the finished bytes instead of storing them.
async fn recording_app(tmp: &TempDir) -> (Router, Received) {
    let config = test_config(tmp);
    let store = SqliteFileStore::connect("sqlite::memory:", config.storage_dir.clone())
        .await
        .unwrap();

    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let completion = FnCompletion(move |path: PathBuf, name: String| {
        let sink = sink.clone();
        async move {
            let bytes = tokio::fs::read(&path).await?;
            let size = bytes.len();
            sink.lock().unwrap().push((name.clone(), bytes));
            Ok::<_, anyhow::Error>(Some(
                CompletionResult::ok().with("name", name).with("size", size),
            ))
        }
    });

    let state = AppState::new(config, Arc::new(store), Arc::new(completion));
    (create_app(state), received)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn raw_chunk(uri: &str, session: &str, bytes: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/octet-stream")
        .header("Cookie", format!("session_id={}", session))
        .body(Body::from(bytes))
        .unwrap()
}

fn dir_entries(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_two_chunk_raw_upload() {
    let tmp = TempDir::new().unwrap();
    let (app, received) = recording_app(&tmp).await;

    let first: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
    let second: Vec<u8> = vec![7u8; 1024];

    let response = app
        .clone()
        .oneshot(raw_chunk(
            "/upload?chunk=0&chunks=2&name=report.pdf",
            "sess1",
            first.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({"success": true}));

    let partial = tmp.path().join("plupload").join("sess1").join("report.pdf");
    assert_eq!(std::fs::metadata(&partial).unwrap().len(), 4096);

    let response = app
        .oneshot(raw_chunk(
            "/upload?chunk=1&chunks=2&name=report.pdf",
            "sess1",
            second.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    assert_eq!(headers["content-type"], "application/json; charset=UTF-8");
    assert_eq!(headers["expires"], "Mon, 26 Jul 1997 05:00:00 GMT");
    assert_eq!(headers["pragma"], "no-cache");
    assert!(headers.contains_key("last-modified"));
    let cache_control: Vec<_> = headers
        .get_all("cache-control")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cache_control.contains(&"no-store, no-cache, must-revalidate".to_string()));

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["name"], "report.pdf");
    assert_eq!(json["size"], 5120);

    let calls = received.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let mut expected = first;
    expected.extend_from_slice(&second);
    assert_eq!(calls[0].1, expected);
    assert!(!partial.exists());
}

#[tokio::test]
async fn test_multipart_single_shot_upload() {
    let tmp = TempDir::new().unwrap();
    let (app, received) = recording_app(&tmp).await;

    let boundary = "---------------------------123456789012345678901234567";
    let multipart_body = format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"name\"\r\n\r\n\
        notes.txt\r\n\
        --{boundary}\r\n\
        Content-Disposition: form-data; name=\"file\"; filename=\"blob\"\r\n\
        Content-Type: text/plain\r\n\r\n\
        hello multipart\r\n\
        --{boundary}--\r\n",
        boundary = boundary
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .header("x-session-id", "formsess")
                .body(Body::from(multipart_body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["name"], "notes.txt");

    let calls = received.lock().unwrap();
    assert_eq!(calls[0].1, b"hello multipart");

    // Neither the artifact nor the spooled part survive the request.
    let session_dir = tmp.path().join("plupload").join("formsess");
    assert!(dir_entries(&session_dir).is_empty());
}

#[tokio::test]
async fn test_multipart_without_file_part_fails() {
    let tmp = TempDir::new().unwrap();
    let (app, received) = recording_app(&tmp).await;

    let boundary = "boundary123";
    let multipart_body = format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"name\"\r\n\r\n\
        orphan.txt\r\n\
        --{boundary}--\r\n",
        boundary = boundary
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(multipart_body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"].is_string());
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_content_disposition_sets_display_name() {
    let tmp = TempDir::new().unwrap();
    let (app, received) = recording_app(&tmp).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload?name=upload.bin")
                .header("Content-Type", "application/octet-stream")
                .header("Content-Disposition", "attachment; filename=\"Quarterly Report.pdf\"")
                .body(Body::from("pdf bytes"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(received.lock().unwrap()[0].0, "Quarterly Report.pdf");
}

#[tokio::test]
async fn test_chunk_out_of_range_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let (app, received) = recording_app(&tmp).await;

    let response = app
        .oneshot(raw_chunk(
            "/upload?chunk=3&chunks=3&name=x.bin",
            "sess1",
            b"late".to_vec(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(received.lock().unwrap().is_empty());
    assert!(!tmp.path().join("plupload").join("sess1").join("x.bin").exists());
}

#[tokio::test]
async fn test_callback_failure_returns_500_and_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = SqliteFileStore::connect("sqlite::memory:", config.storage_dir.clone())
        .await
        .unwrap();
    let completion = FnCompletion(|_path: PathBuf, _name: String| async move {
        Err::<Option<CompletionResult>, _>(anyhow::anyhow!("downstream rejected upload"))
    });
    let app = create_app(AppState::new(config, Arc::new(store), Arc::new(completion)));

    let response = app
        .oneshot(raw_chunk("/upload?name=lost.bin", "sess1", b"data".to_vec()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert!(
        !json["error"]
            .as_str()
            .unwrap()
            .contains("downstream rejected upload")
    );
    assert!(!tmp.path().join("plupload").join("sess1").join("lost.bin").exists());
}

#[tokio::test]
async fn test_stored_upload_can_be_downloaded_and_deleted() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = Arc::new(
        SqliteFileStore::connect("sqlite::memory:", config.storage_dir.clone())
            .await
            .unwrap(),
    );
    let completion = StoreCompletion::new(
        store.clone(),
        config.base_download_url.clone(),
        config.base_delete_url.clone(),
    );
    let app = create_app(AppState::new(config, store, Arc::new(completion)));

    let response = app
        .clone()
        .oneshot(raw_chunk(
            "/upload?name=notes.txt",
            "sess1",
            b"keep these bytes".to_vec(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let download_url = json["downloadUrl"].as_str().unwrap().to_string();
    let delete_url = json["deleteUrl"].as_str().unwrap().to_string();
    assert_eq!(json["size"], 16);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&download_url)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-disposition"]
            .to_str()
            .unwrap()
            .contains("filename=\"notes.txt\"")
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"keep these bytes");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&delete_url)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .uri(&download_url)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_file_reference_is_404() {
    let tmp = TempDir::new().unwrap();
    let (app, _) = recording_app(&tmp).await;

    for method in ["GET", "DELETE"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/files/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_health_and_request_id() {
    let tmp = TempDir::new().unwrap();
    let (app, _) = recording_app(&tmp).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["workspace"], "pending");
}

#[tokio::test]
async fn test_timeout_still_removes_artifact() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.max_execution_secs = 1;
    let store = SqliteFileStore::connect("sqlite::memory:", config.storage_dir.clone())
        .await
        .unwrap();
    let completion = FnCompletion(|_path: PathBuf, _name: String| async move {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        Ok::<_, anyhow::Error>(None)
    });
    let app = create_app(AppState::new(config, Arc::new(store), Arc::new(completion)));

    let response = app
        .oneshot(raw_chunk("/upload?name=slow.bin", "sess1", b"slow bytes".to_vec()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains("maximum execution time")
    );

    // The callback outlives the request and the artifact is removed after it.
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert!(!tmp.path().join("plupload").join("sess1").join("slow.bin").exists());
}

#[tokio::test]
async fn test_oversized_raw_body_is_413() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.max_body_size = 16;
    let store = SqliteFileStore::connect("sqlite::memory:", config.storage_dir.clone())
        .await
        .unwrap();
    let completion = FnCompletion(|_path: PathBuf, _name: String| async move {
        Ok::<_, anyhow::Error>(None)
    });
    let app = create_app(AppState::new(config, Arc::new(store), Arc::new(completion)));

    let response = app
        .oneshot(raw_chunk("/upload?name=big.bin", "sess1", vec![0u8; 64]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
