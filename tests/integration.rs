//! End-to-end scenarios against a `wiremock` source and sink, mirroring
//! the literal scenarios the unit tests beside `leg.rs`/`coordinator.rs`
//! can't exercise without a real HTTP round trip.

use md5::{Digest, Md5};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use transload::{SessionConfig, Transload, UploadConfig, UploadMethod};

fn source_body() -> Vec<u8> {
    // Deterministic, not the literal 5 MiB from the scenario write-up --
    // these tests check against a hash computed from this content, not
    // a hardcoded one.
    (0..200_000u32).flat_map(|n| n.to_le_bytes()).collect()
}

async fn mount_source(server: &MockServer, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path("/source.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn two_post_uploads_one_with_random_suffix() {
    let server = MockServer::start().await;
    let body = source_body();
    mount_source(&server, body.clone()).await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_string("https://sink.example/5MB.zip"))
        .mount(&server)
        .await;

    let download_url = format!("{}/source.bin", server.uri());
    let upload_url = format!("{}/upload", server.uri());

    let uploads = vec![
        UploadConfig::new(&upload_url),
        UploadConfig::new(&upload_url).file_name("test.zip").random_bytes_count(12),
    ];

    let result = Transload::new(download_url, uploads, SessionConfig::new().calculate_md5(true))
        .run()
        .await
        .expect("transload should not throw");

    let expected_md5 = hex::encode(Md5::new_with_prefix(&body).finalize());

    assert_eq!(result.size, body.len() as u64);
    assert_eq!(result.md5.as_deref(), Some(expected_md5.as_str()));
    assert_eq!(result.uploads.len(), 2);

    assert_eq!(result.uploads[0].size, body.len() as u64);
    assert_eq!(result.uploads[0].md5.as_deref(), Some(expected_md5.as_str()));
    assert!(result.uploads[0].error.is_none());

    assert_eq!(result.uploads[1].size, body.len() as u64 + 12);
    assert_ne!(result.uploads[1].md5, result.uploads[0].md5);
    assert!(result.uploads[1].error.is_none());
}

#[tokio::test]
async fn two_put_uploads_to_raw_body_endpoints() {
    let server = MockServer::start().await;
    let body = source_body();
    mount_source(&server, body.clone()).await;

    Mock::given(method("PUT"))
        .and(path("/sink"))
        .respond_with(ResponseTemplate::new(200).set_body_string("https://sink.example/test.zip"))
        .mount(&server)
        .await;

    let download_url = format!("{}/source.bin", server.uri());
    let upload_url = format!("{}/sink", server.uri());

    let uploads = vec![
        UploadConfig::new(&upload_url).method(UploadMethod::Put).header("User-Agent", "curl/7.83.1"),
        UploadConfig::new(&upload_url)
            .method(UploadMethod::Put)
            .file_name("test.zip")
            .random_bytes_count(12)
            .header("User-Agent", "curl/7.83.1"),
    ];

    let result = Transload::new(download_url, uploads, SessionConfig::new().calculate_md5(true))
        .run()
        .await
        .expect("transload should not throw");

    assert_eq!(result.uploads.len(), 2);
    for upload in &result.uploads {
        assert!(upload.error.is_none());
        match upload.response.as_ref().expect("response recorded") {
            transload::UploadResponse::Text(text) => {
                assert!(text.starts_with("https://sink.example/"), "unexpected body: {text}");
            }
            other => panic!("expected raw text response, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn unresolvable_upload_host_with_local_save_records_per_leg_error() {
    let server = MockServer::start().await;
    let body = source_body();
    mount_source(&server, body.clone()).await;

    let download_url = format!("{}/source.bin", server.uri());
    let local_path = std::env::temp_dir().join(format!(
        "transload-test-{}.bin",
        std::process::id()
    ));

    let uploads = vec![UploadConfig::new("https://non-existing-domain.invalid/sink")];
    let config = SessionConfig::new()
        .calculate_md5(true)
        .save_to_local_path(local_path.to_string_lossy().into_owned());

    let result = Transload::new(download_url, uploads, config)
        .run()
        .await
        .expect("transload should not throw even when every leg fails");

    assert_eq!(result.uploads.len(), 1);
    assert!(result.uploads[0].error.is_some());
    assert!(result.uploads[0].md5.is_none());

    let local = result.local.expect("local save result present");
    assert_eq!(local.path, local_path.to_string_lossy());
    assert_eq!(local.size, body.len() as u64);

    let expected_md5 = hex::encode(Md5::new_with_prefix(&body).finalize());
    assert_eq!(result.md5.as_deref(), Some(expected_md5.as_str()));

    let written = tokio::fs::read(&local_path).await.expect("local file written");
    assert_eq!(written, body);
    let _ = tokio::fs::remove_file(&local_path).await;
}

#[tokio::test]
async fn unresolvable_upload_host_without_local_save_aborts_source() {
    let server = MockServer::start().await;
    let body = source_body();
    mount_source(&server, body.clone()).await;

    let download_url = format!("{}/source.bin", server.uri());
    let uploads = vec![UploadConfig::new("https://non-existing-domain.invalid/sink")];

    let result = Transload::new(download_url, uploads, SessionConfig::new().calculate_md5(true))
        .run()
        .await
        .expect("transload should not throw");

    assert!(result.uploads[0].error.is_some());
    assert!(result.md5.is_none(), "source should be aborted once its one leg is unusable");
}

#[tokio::test]
async fn source_open_failure_propagates_as_session_error() {
    let uploads = vec![UploadConfig::new("https://non-existing-domain.invalid/sink")];
    let err = Transload::new(
        "https://another-non-existing-domain.invalid/file.bin",
        uploads,
        SessionConfig::new(),
    )
    .run()
    .await
    .expect_err("unreachable source host must fail the whole session");

    assert!(err.to_string().contains("failed to open source"));
}

#[tokio::test]
async fn request_shape_is_multipart_for_post() {
    let server = MockServer::start().await;
    let body = source_body();
    mount_source(&server, body.clone()).await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(body_string_contains("Content-Disposition"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
        .mount(&server)
        .await;

    let download_url = format!("{}/source.bin", server.uri());
    let upload_url = format!("{}/upload", server.uri());
    let uploads = vec![UploadConfig::new(&upload_url)];

    let result = Transload::new(download_url, uploads, SessionConfig::new())
        .run()
        .await
        .expect("transload should not throw");

    assert!(result.uploads[0].error.is_none());
}
