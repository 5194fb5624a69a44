//! Permit endpoints.
//!
//! - `POST /api/permits`: validate and run an application
//! - `GET /api/permits`: status overview

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::apps::permit::{self, PermitApplication, PermitOverview};
use crate::pipeline::PipelineOutcome;

/// `POST /api/permits`
pub async fn submit(
    State(ctx): State<ApiContext>,
    Json(application): Json<PermitApplication>,
) -> Result<Json<PipelineOutcome>, ApiError> {
    let outcome = ctx
        .run_blocking(move |core| permit::submit(core, &application))
        .await?;
    Ok(Json(outcome))
}

/// `GET /api/permits`
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<PermitOverview>, ApiError> {
    let overview = ctx
        .run_blocking(|core| permit::overview(core.store()))
        .await?;
    Ok(Json(overview))
}
