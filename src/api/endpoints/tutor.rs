//! `POST /api/tutor`: grade-aware lesson answer.
//! `POST /api/tutor/tools`: teacher tool content.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::apps::teacher::{self, TeacherToolRequest, TeacherToolResponse};
use crate::apps::tutor::{self, LessonRequest, LessonResponse};

pub async fn answer(
    State(ctx): State<ApiContext>,
    Json(request): Json<LessonRequest>,
) -> Result<Json<LessonResponse>, ApiError> {
    let response = ctx
        .run_blocking(move |core| tutor::answer(core, &request))
        .await?;
    Ok(Json(response))
}

pub async fn tool(
    State(ctx): State<ApiContext>,
    Json(request): Json<TeacherToolRequest>,
) -> Result<Json<TeacherToolResponse>, ApiError> {
    let response = ctx
        .run_blocking(move |core| teacher::generate(core, &request))
        .await?;
    Ok(Json(response))
}
