//! JSON API over the resident registry: resident CRUD, the sectoral row
//! endpoints, per-barangay summaries, and an on-demand reconciliation
//! trigger. Every write goes through the sectoral engine so flags can
//! never drift from resident attributes on this path.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use citizenly_core::{
    calculate_age, EducationAttainment, EducationStatus, EmploymentStatus, Resident,
    SectoralRecord, SectoralWrite,
};
use citizenly_storage::StoreError;
use citizenly_sync::{EngineError, ReconciliationJob, SectoralEngine};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use uuid::Uuid;

pub const CRATE_NAME: &str = "citizenly-web";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SectoralEngine>,
    pub job: Arc<ReconciliationJob>,
}

impl AppState {
    pub fn new(engine: Arc<SectoralEngine>, job: Arc<ReconciliationJob>) -> Self {
        Self { engine, job }
    }
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(String),
    Invalid(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Invalid(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("server error: {err}"),
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ResidentNotFound(id) => {
                ApiError::NotFound(format!("resident {id} not found"))
            }
            StoreError::Conflict(id) => {
                ApiError::Conflict(format!("write conflict on resident {id}; retry"))
            }
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ResidentMissing(id) => {
                ApiError::NotFound(format!("resident {id} not found"))
            }
            EngineError::Store(store) => store.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

/// Resident attributes as submitted on create and update. Enum fields
/// reject unknown values at the boundary; rows already in the store with
/// values we cannot read still classify as non-qualifying downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct ResidentInput {
    pub first_name: String,
    pub last_name: String,
    pub barangay_code: String,
    pub birthdate: NaiveDate,
    #[serde(default)]
    pub education_attainment: Option<EducationAttainment>,
    #[serde(default)]
    pub education_status: Option<EducationStatus>,
    #[serde(default)]
    pub employment_status: Option<EmploymentStatus>,
    #[serde(default)]
    pub ethnicity: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResidentResponse {
    #[serde(flatten)]
    pub resident: Resident,
    pub sectoral: SectoralRecord,
}

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    page: Option<i64>,
    per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ResidentPage {
    residents: Vec<Resident>,
    page: i64,
    per_page: i64,
    total: i64,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/residents",
            get(list_residents_handler).post(create_resident_handler),
        )
        .route(
            "/residents/{id}",
            get(get_resident_handler)
                .put(update_resident_handler)
                .delete(delete_resident_handler),
        )
        .route(
            "/residents/{id}/sectoral",
            get(get_sectoral_handler).put(put_sectoral_handler),
        )
        .route("/sectoral/summary", get(sectoral_summary_handler))
        .route("/admin/reconcile", post(reconcile_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn validate_input(input: &ResidentInput) -> Result<(), ApiError> {
    if input.first_name.trim().is_empty() || input.last_name.trim().is_empty() {
        return Err(ApiError::Invalid(
            "first_name and last_name must not be empty".to_string(),
        ));
    }
    if input.barangay_code.trim().is_empty() {
        return Err(ApiError::Invalid(
            "barangay_code must not be empty".to_string(),
        ));
    }
    if calculate_age(input.birthdate, Utc::now().date_naive()).is_none() {
        return Err(ApiError::Invalid(
            "birthdate is in the future or implausibly old".to_string(),
        ));
    }
    Ok(())
}

fn resident_from_input(
    id: Uuid,
    input: ResidentInput,
    created_at: chrono::DateTime<Utc>,
) -> Resident {
    Resident {
        id,
        first_name: input.first_name,
        last_name: input.last_name,
        barangay_code: input.barangay_code,
        birthdate: input.birthdate,
        education_attainment: input.education_attainment,
        education_status: input.education_status,
        employment_status: input.employment_status,
        ethnicity: input.ethnicity,
        created_at,
        updated_at: Utc::now(),
    }
}

async fn create_resident_handler(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ResidentInput>,
) -> Result<(StatusCode, Json<ResidentResponse>), ApiError> {
    validate_input(&input)?;
    let now = Utc::now();
    let resident = resident_from_input(Uuid::new_v4(), input, now);
    let sectoral = state.engine.resident_created(&resident).await?;
    Ok((
        StatusCode::CREATED,
        Json(ResidentResponse { resident, sectoral }),
    ))
}

async fn get_resident_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<ResidentResponse>, ApiError> {
    let store = state.engine.store();
    let resident = store
        .fetch_resident(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("resident {id} not found")))?;
    let sectoral = store
        .fetch_sectoral(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no sectoral row for resident {id}; run reconciliation")))?;
    Ok(Json(ResidentResponse { resident, sectoral }))
}

async fn update_resident_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
    Json(input): Json<ResidentInput>,
) -> Result<Json<ResidentResponse>, ApiError> {
    validate_input(&input)?;
    let existing = state
        .engine
        .store()
        .fetch_resident(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("resident {id} not found")))?;
    let resident = resident_from_input(id, input, existing.created_at);
    let sectoral = state.engine.resident_updated(&resident).await?;
    Ok(Json(ResidentResponse { resident, sectoral }))
}

async fn delete_resident_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.engine.store().delete_resident(id).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("resident {id} not found")))
    }
}

async fn list_residents_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ResidentPage>, ApiError> {
    let per_page = query.per_page.unwrap_or(50).clamp(1, 200);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| ApiError::Invalid("page is out of range".to_string()))?;
    let store = state.engine.store();
    let residents = store.list_residents(offset, per_page).await?;
    let total = store.count_residents().await?;
    Ok(Json(ResidentPage {
        residents,
        page,
        per_page,
        total,
    }))
}

async fn get_sectoral_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<SectoralRecord>, ApiError> {
    let store = state.engine.store();
    store
        .fetch_resident(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("resident {id} not found")))?;
    let record = store
        .fetch_sectoral(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no sectoral row for resident {id}; run reconciliation")))?;
    Ok(Json(record))
}

/// Manual sectoral fields land as submitted; derived fields in the body are
/// ignored and recomputed from the resident's attributes.
async fn put_sectoral_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
    Json(write): Json<SectoralWrite>,
) -> Result<Json<SectoralRecord>, ApiError> {
    let record = state.engine.sectoral_row_write(id, &write).await?;
    Ok(Json(record))
}

async fn sectoral_summary_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<citizenly_core::BarangaySectoralCounts>>, ApiError> {
    let counts = state.engine.store().sectoral_counts().await?;
    Ok(Json(counts))
}

async fn reconcile_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<citizenly_sync::ReconcileRunSummary>, ApiError> {
    let summary = state.job.run_once().await?;
    Ok(Json(summary))
}
