//! HTTP request handlers
//!
//! Thin adapters between JSON/bytes and [`crate::service::ScanService`].
//! Anything that touches disk or renders images runs on the blocking pool.

use super::error::{ApiError, ApiResult};
use super::server::AppState;
use crate::{
    enums::Orientation,
    error::ServiceError,
    grid::TileAddress,
    mask::{BinaryMask, MaskError, Selection},
    models::{ScanCategory, ScanId, ScanMetadata, Slice, SliceId},
};

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    key: String,
    name: String,
    #[serde(default)]
    image_path: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateScanRequest {
    category: String,
    number_of_slices: u32,
}

#[derive(Debug, Serialize)]
pub struct CreateScanResponse {
    scan_id: ScanId,
}

#[derive(Debug, Deserialize)]
pub struct RandomScanQuery {
    category: String,
}

#[derive(Debug, Serialize)]
pub struct NewSliceResponse {
    slice_id: SliceId,
    location: u32,
}

fn default_count() -> usize {
    1
}

#[derive(Debug, Deserialize)]
pub struct SliceRangeQuery {
    #[serde(default)]
    begin: usize,
    #[serde(default = "default_count")]
    count: usize,
    #[serde(default)]
    orientation: Orientation,
}

#[derive(Debug, Serialize)]
pub struct SliceImage {
    slice: Slice,
    /// Base64 encoded PNG
    image: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    x: u32,
    y: u32,
    slice_index: u32,
    width: u32,
    height: u32,
    /// Rows of 0/1 cells, `height` rows of `width` cells. Empty means none.
    #[serde(default)]
    binary_mask: Option<Vec<Vec<u8>>>,
}

impl TryFrom<SelectionRequest> for Selection {
    type Error = MaskError;

    fn try_from(request: SelectionRequest) -> Result<Self, Self::Error> {
        let selection = Selection::rectangle(
            request.x,
            request.y,
            request.slice_index,
            request.width,
            request.height,
        );
        match request.binary_mask {
            None => Ok(selection),
            Some(rows) if rows.is_empty() => Ok(selection),
            Some(rows) => {
                let rows = rows
                    .into_iter()
                    .map(|row| row.into_iter().map(|cell| cell != 0).collect())
                    .collect();
                Ok(selection.with_mask(BinaryMask::from_rows(rows)?))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewLabelRequest {
    selections: Vec<SelectionRequest>,
}

#[derive(Debug, Serialize)]
pub struct NewLabelResponse {
    label_id: Uuid,
}

// ============================================================================
// Helpers
// ============================================================================

async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

fn png_response(bytes: Vec<u8>) -> Response {
    let mut response = bytes.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    response
}

fn encode_images(images: Vec<(Slice, Vec<u8>)>) -> Json<Vec<SliceImage>> {
    Json(
        images
            .into_iter()
            .map(|(slice, png)| SliceImage {
                slice,
                image: STANDARD.encode(png),
            })
            .collect(),
    )
}

// ============================================================================
// Health
// ============================================================================

/// GET /healthz
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Image server
// ============================================================================

/// GET /api/v1/image_server/:z/:y/:x
pub async fn get_tile(
    State(state): State<AppState>,
    Path((z, y, x)): Path<(u32, u32, u32)>,
) -> ApiResult<Response> {
    let service = state.service.clone();
    let bytes = blocking(move || service.get_tile(TileAddress::new(z, y, x))).await?;
    Ok(png_response(bytes))
}

// ============================================================================
// Categories
// ============================================================================

/// GET /api/v1/scans/categories
pub async fn list_categories(State(state): State<AppState>) -> Json<Vec<ScanCategory>> {
    Json(state.service.get_available_scan_categories())
}

/// POST /api/v1/scans/categories
pub async fn create_category(
    State(state): State<AppState>,
    Json(request): Json<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<ScanCategory>)> {
    let category =
        state
            .service
            .create_scan_category(&request.key, &request.name, &request.image_path)?;
    Ok((StatusCode::CREATED, Json(category)))
}

// ============================================================================
// Scans
// ============================================================================

/// POST /api/v1/scans
pub async fn create_scan(
    State(state): State<AppState>,
    Json(request): Json<CreateScanRequest>,
) -> ApiResult<(StatusCode, Json<CreateScanResponse>)> {
    let scan = state
        .service
        .create_empty_scan(&request.category, request.number_of_slices)?;
    Ok((StatusCode::CREATED, Json(CreateScanResponse { scan_id: scan.id })))
}

/// GET /api/v1/scans/random?category=KEY
pub async fn random_scan(
    State(state): State<AppState>,
    Query(query): Query<RandomScanQuery>,
) -> ApiResult<Json<ScanMetadata>> {
    Ok(Json(state.service.get_random_scan(&query.category)?))
}

/// GET /api/v1/scans/:scan_id
pub async fn scan_metadata(
    State(state): State<AppState>,
    Path(scan_id): Path<ScanId>,
) -> ApiResult<Json<ScanMetadata>> {
    Ok(Json(state.service.get_metadata(scan_id)?))
}

/// POST /api/v1/scans/:scan_id/slices
///
/// Body is the raw DICOM file. Conversion happens in the background.
pub async fn upload_slice(
    State(state): State<AppState>,
    Path(scan_id): Path<ScanId>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<NewSliceResponse>)> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty DICOM upload".to_string()));
    }
    let slice = state.service.add_new_slice(scan_id, body.to_vec())?;
    Ok((
        StatusCode::CREATED,
        Json(NewSliceResponse {
            slice_id: slice.id,
            location: slice.location,
        }),
    ))
}

/// GET /api/v1/scans/:scan_id/slices?begin=&count=&orientation=
pub async fn list_slices(
    State(state): State<AppState>,
    Path(scan_id): Path<ScanId>,
    Query(query): Query<SliceRangeQuery>,
) -> ApiResult<Json<Vec<SliceImage>>> {
    let service = state.service.clone();
    let images = blocking(move || {
        service.get_slices_for_scan(scan_id, query.begin, query.count, query.orientation)
    })
    .await?;
    Ok(encode_images(images))
}

/// GET /api/v1/scans/:scan_id/validation_mask?begin=&count=
pub async fn validation_mask(
    State(state): State<AppState>,
    Path(scan_id): Path<ScanId>,
    Query(query): Query<SliceRangeQuery>,
) -> ApiResult<Json<Vec<SliceImage>>> {
    let service = state.service.clone();
    let images =
        blocking(move || service.get_validation_mask_for_scan(scan_id, query.begin, query.count))
            .await?;
    Ok(encode_images(images))
}

/// POST /api/v1/scans/:scan_id/label
pub async fn add_label(
    State(state): State<AppState>,
    Path(scan_id): Path<ScanId>,
    Json(request): Json<NewLabelRequest>,
) -> ApiResult<(StatusCode, Json<NewLabelResponse>)> {
    let selections = request
        .selections
        .into_iter()
        .map(Selection::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(ServiceError::from)?;
    let label = state.service.add_label(scan_id, selections)?;
    Ok((StatusCode::CREATED, Json(NewLabelResponse { label_id: label.id })))
}
