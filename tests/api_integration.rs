//! Integration tests for the HTTP API
//!
//! Drives the router in-process: tile serving, scan and slice workflow with
//! the background worker, label creation and validation masks.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use dicom_tiles::{
    LayerImage, TileExtractor,
    api::{AppState, create_router},
    config::ServerConfig,
    dispatcher::ChannelDispatcher,
    models::SliceStatus,
    repository::{InMemoryRepository, Repository},
    resolver::FsTileStore,
    service::ScanService,
    worker,
};

struct TestApp {
    router: Router,
    repository: Arc<InMemoryRepository>,
    tiles: TempDir,
}

fn setup_test_app() -> TestApp {
    let tiles = tempfile::tempdir().unwrap();
    let repository = Arc::new(InMemoryRepository::new());
    let (dispatcher, tasks) = ChannelDispatcher::new();
    tokio::spawn(worker::run(tasks, repository.clone()));

    let service = ScanService::new(
        repository.clone(),
        Arc::new(dispatcher),
        Arc::new(FsTileStore::new(tiles.path())),
    );
    let config = ServerConfig {
        tiles_root: tiles.path().to_path_buf(),
        ..ServerConfig::default()
    };
    let router = create_router(AppState::new(service), &config);

    TestApp {
        router,
        repository,
        tiles,
    }
}

async fn send(app: &TestApp, method: Method, path: &str, body: Body) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &TestApp, path: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, Method::GET, path, Body::empty()).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &TestApp, path: &str, body: Value) -> (StatusCode, Value) {
    let (status, body) = send(app, Method::POST, path, Body::from(body.to_string())).await;
    (status, serde_json::from_slice(&body).unwrap())
}

/// Create a category and a scan, upload `slices` DICOM slices of 16x16 pixels
/// and wait for the worker to convert them
async fn converted_scan(app: &TestApp, slices: u32) -> Uuid {
    let (status, _) = post_json(
        app,
        "/api/v1/scans/categories",
        json!({"key": "KIDNEYS", "name": "Kidneys", "image_path": "assets/kidneys.svg"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post_json(
        app,
        "/api/v1/scans",
        json!({"category": "KIDNEYS", "number_of_slices": slices}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let scan_id: Uuid = body["scan_id"].as_str().unwrap().parse().unwrap();

    let upload = common::dicom_bytes(&common::tiled_layer(16, 1, None, |_| 128));
    for location in 0..slices {
        let (status, body) = send(
            app,
            Method::POST,
            &format!("/api/v1/scans/{scan_id}/slices"),
            Body::from(upload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["location"], location);
    }

    for _ in 0..200 {
        let processed = app
            .repository
            .get_slices_by_scan_id(scan_id, dicom_tiles::Orientation::Axial)
            .unwrap()
            .iter()
            .all(|slice| slice.status == SliceStatus::Processed);
        if processed {
            return scan_id;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("worker did not convert the uploaded slices");
}

fn decode_image(entry: &Value) -> image::GrayImage {
    let png = STANDARD.decode(entry["image"].as_str().unwrap()).unwrap();
    image::load_from_memory(&png).unwrap().to_luma8()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_test_app();
    let (status, body) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_tiles_are_served_by_address() {
    let app = setup_test_app();
    let layer = LayerImage::from_gray_tiles(ndarray::Array3::from_elem((5, 4, 4), 7), 12, 8).unwrap();
    TileExtractor::new(app.tiles.path()).extract_layer(0, &layer).unwrap();

    let request = Request::builder()
        .uri("/api/v1/image_server/0/1/1")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(image::load_from_memory(&body).unwrap().to_luma8().get_pixel(0, 0).0, [7]);

    // (1, 2) is past the stored tiles, (3, 0) past the grid
    for path in ["/api/v1/image_server/0/1/2", "/api/v1/image_server/3/0/0"] {
        let (status, body) = get_json(&app, path).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn test_label_workflow_and_validation_mask() {
    let app = setup_test_app();
    let scan_id = converted_scan(&app, 10).await;

    let (status, body) = get_json(&app, &format!("/api/v1/scans/{scan_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["number_of_slices"], 10);

    let (status, body) =
        get_json(&app, &format!("/api/v1/scans/{scan_id}/slices?begin=8&count=5")).await;
    assert_eq!(status, StatusCode::OK);
    let slices = body.as_array().unwrap();
    assert_eq!(slices.len(), 2);
    assert_eq!(slices[0]["slice"]["location"], 8);
    assert_eq!(slices[0]["slice"]["orientation"], "Z");
    assert_eq!(decode_image(&slices[0]).dimensions(), (16, 16));

    let (status, body) = post_json(
        &app,
        &format!("/api/v1/scans/{scan_id}/label"),
        json!({"selections": [{"x": 0, "y": 0, "slice_index": 4, "width": 5, "height": 5}]}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["label_id"].is_string());

    let (status, body) = get_json(
        &app,
        &format!("/api/v1/scans/{scan_id}/validation_mask?begin=4&count=1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let planes = body.as_array().unwrap();
    assert_eq!(planes.len(), 1);
    let mask = decode_image(&planes[0]);
    for (x, y, pixel) in mask.enumerate_pixels() {
        let expected = if x < 5 && y < 5 { 255 } else { 0 };
        assert_eq!(pixel.0[0], expected, "pixel ({x}, {y})");
    }

    let (_, body) = get_json(
        &app,
        &format!("/api/v1/scans/{scan_id}/validation_mask?begin=0&count=1"),
    )
    .await;
    assert!(decode_image(&body[0]).pixels().all(|p| p.0[0] == 0));

    let (_, body) = get_json(
        &app,
        &format!("/api/v1/scans/{scan_id}/validation_mask?begin=8&count=5"),
    )
    .await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_sub_mask_with_wrong_shape_is_rejected() {
    let app = setup_test_app();
    let scan_id = converted_scan(&app, 2).await;

    let (status, body) = post_json(
        &app,
        &format!("/api/v1/scans/{scan_id}/label"),
        json!({"selections": [
            {"x": 0, "y": 0, "slice_index": 0, "width": 2, "height": 2},
            {"x": 0, "y": 0, "slice_index": 1, "width": 2, "height": 2,
             "binary_mask": [[1, 0, 1], [0, 1, 0]]}
        ]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(app.repository.get_labels_by_scan_id(scan_id).unwrap().is_empty());

    let (status, _) = post_json(
        &app,
        &format!("/api/v1/scans/{scan_id}/label"),
        json!({"selections": [
            {"x": 0, "y": 0, "slice_index": 1, "width": 2, "height": 2,
             "binary_mask": [[1, 0], [0, 1]]}
        ]}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = get_json(
        &app,
        &format!("/api/v1/scans/{scan_id}/validation_mask?begin=1&count=1"),
    )
    .await;
    let mask = decode_image(&body[0]);
    assert_eq!(mask.get_pixel(0, 0).0, [255]);
    assert_eq!(mask.get_pixel(1, 0).0, [0]);
    assert_eq!(mask.get_pixel(1, 1).0, [255]);
}

#[tokio::test]
async fn test_validation_mask_waits_for_conversion() {
    let app = setup_test_app();
    let (status, _) = post_json(
        &app,
        "/api/v1/scans/categories",
        json!({"key": "LUNGS", "name": "Lungs"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = post_json(
        &app,
        "/api/v1/scans",
        json!({"category": "LUNGS", "number_of_slices": 3}),
    )
    .await;
    let scan_id = body["scan_id"].as_str().unwrap().to_string();

    let (status, body) = get_json(
        &app,
        &format!("/api/v1/scans/{scan_id}/validation_mask?begin=0&count=3"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_oversized_scan_is_rejected() {
    let app = setup_test_app();
    let (status, _) = post_json(
        &app,
        "/api/v1/scans/categories",
        json!({"key": "LIVER", "name": "Liver"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post_json(
        &app,
        "/api/v1/scans",
        json!({"category": "LIVER", "number_of_slices": u32::MAX}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (_, body) = get_json(&app, "/api/v1/scans/random?category=LIVER").await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_resources_are_not_found() {
    let app = setup_test_app();

    let (status, _) = get_json(&app, &format!("/api/v1/scans/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&app, "/api/v1/scans/random?category=HEART").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(
        &app,
        "/api/v1/scans",
        json!({"category": "HEART", "number_of_slices": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(
        &app,
        "/api/v1/scans/categories",
        json!({"key": "HEART", "name": "Heart"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = post_json(
        &app,
        "/api/v1/scans/categories",
        json!({"key": "HEART", "name": "Heart again"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, body) = get_json(&app, "/api/v1/scans/categories").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}
