//! Transport-level upload failures.
//!
//! Raw multipart requests sent through the router with `oneshot`, so the
//! body can be oversized or cut off mid-stream.

mod common;

use axum::http::StatusCode;
use bugvault::models::UploadMethod;
use common::{app, extract_json, multipart_body, post_multipart, send, TestWorld};

#[tokio::test]
async fn test_complete_raw_upload_is_stored() {
    let world = TestWorld::new(UploadMethod::Disk).await;
    let uri = format!("/bugs/{}/attachments", world.bug_id);

    let request = post_multipart(
        &uri,
        &world.developer_token,
        multipart_body("raw.bin", &[1, 2, 3, 4], true),
    );
    let response = send(app(&world.state), request).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = extract_json(response).await;
    assert_eq!(body["filename"], "raw.bin");
    assert_eq!(body["size"], 4);
    assert_eq!(TestWorld::file_count(&world.folder_a), 1);
}

#[tokio::test]
async fn test_body_over_transport_limit_reports_file_too_big() {
    let world = TestWorld::with_config(UploadMethod::Disk, |files| {
        files.post_max_size = 1024;
    })
    .await;
    let uri = format!("/bugs/{}/attachments", world.bug_id);

    let request = post_multipart(
        &uri,
        &world.developer_token,
        multipart_body("big.bin", &vec![0u8; 8 * 1024], true),
    );
    let response = send(app(&world.state), request).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = extract_json(response).await;
    assert_eq!(body["error"]["code"], "FILE_TOO_BIG");
    assert_eq!(TestWorld::file_count(&world.folder_a), 0);
}

#[tokio::test]
async fn test_truncated_body_reports_no_upload() {
    let world = TestWorld::new(UploadMethod::Disk).await;
    let uri = format!("/bugs/{}/attachments", world.bug_id);

    let request = post_multipart(
        &uri,
        &world.developer_token,
        multipart_body("cut.bin", b"partial content", false),
    );
    let response = send(app(&world.state), request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response).await;
    assert_eq!(body["error"]["code"], "FILE_NO_UPLOAD");
    assert_eq!(TestWorld::file_count(&world.folder_a), 0);
}
