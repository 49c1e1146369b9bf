//! Read endpoints over stored frameworks.

use axum::extract::{Path, State};
use axum::Json;

use crate::api::{ApiError, AppState};
use crate::types::{ControlRecord, FrameworkMetadata};

/// GET /frameworks: metadata of every stored framework, standard and custom.
pub async fn list_frameworks(
    State(state): State<AppState>,
) -> Result<Json<Vec<FrameworkMetadata>>, ApiError> {
    let frameworks = state.store.read_all_frameworks().await?;
    Ok(Json(frameworks))
}

/// GET /frameworks/:framework_id/controls: empty array for an unknown id.
pub async fn framework_controls(
    State(state): State<AppState>,
    Path(framework_id): Path<String>,
) -> Result<Json<Vec<ControlRecord>>, ApiError> {
    let controls = state.store.read_framework_controls(&framework_id).await?;
    Ok(Json(controls))
}
