//! Liveness plus a one-glance view of the catalog and both jobs.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::routes::ApiState;
use crate::db::catalog::read_max_id;
use crate::error::AppError;
use crate::job::status::JobState;
use crate::types::now_ms;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    /// Highest catalog id; the upper bound a fresh job run would walk to.
    pub max_id: i64,
    pub job: JobState,
    pub dual_job: JobState,
    pub now_ms: i64,
}

pub async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, AppError> {
    let max_id = read_max_id(&state.pool).await?;
    Ok(Json(HealthResponse {
        status: "ok",
        max_id,
        job: state.job.status().state,
        dual_job: state.dual_job.status().state,
        now_ms: now_ms(),
    }))
}
