//! `POST /api/emergency`: scene assessment, plan and field report.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::apps::emergency::{self, DisasterReport, EmergencyOutcome};

pub async fn respond(
    State(ctx): State<ApiContext>,
    Json(report): Json<DisasterReport>,
) -> Result<Json<EmergencyOutcome>, ApiError> {
    let outcome = ctx
        .run_blocking(move |core| emergency::respond(core, &report))
        .await?;
    Ok(Json(outcome))
}
