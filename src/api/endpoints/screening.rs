//! `POST /api/screening`: collaborative AML screening of one transaction.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::apps::screening::{self, ScreeningReport, ScreeningRequest};

pub async fn screen(
    State(ctx): State<ApiContext>,
    Json(request): Json<ScreeningRequest>,
) -> Result<Json<ScreeningReport>, ApiError> {
    let report = ctx
        .run_blocking(move |core| screening::screen(core, &request))
        .await?;
    Ok(Json(report))
}
