//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model: String,
    /// Whether the completion service lists the configured model.
    pub model_available: bool,
    pub items: usize,
    pub uptime_secs: u64,
}

/// `GET /api/health`: service status and model availability.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    let (model_available, items) = ctx
        .run_blocking(|core| {
            let available = core
                .completion()
                .probe_model(&core.config().model)
                .unwrap_or_else(|e| {
                    tracing::debug!(error = %e, "Model availability check failed");
                    false
                });
            core.store().len().map(|items| (available, items))
        })
        .await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        model: ctx.core.config().model.clone(),
        model_available,
        items,
        uptime_secs: ctx.core.uptime_secs(),
    }))
}
