//! Item state and history endpoints, shared by every app.

use axum::extract::{Path, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::context::{ItemHistory, ItemState};

/// `GET /api/items/:id/state`
pub async fn state(
    State(ctx): State<ApiContext>,
    Path(item_id): Path<String>,
) -> Result<Json<ItemState>, ApiError> {
    let state = ctx
        .core
        .store()
        .get_state(&item_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Item {item_id}")))?;
    Ok(Json(state))
}

/// `GET /api/items/:id/history`
///
/// Unknown ids yield 404 rather than an empty history.
pub async fn history(
    State(ctx): State<ApiContext>,
    Path(item_id): Path<String>,
) -> Result<Json<ItemHistory>, ApiError> {
    let store = ctx.core.store();
    if store.get_state(&item_id)?.is_none() {
        return Err(ApiError::NotFound(format!("Item {item_id}")));
    }
    Ok(Json(store.get_history(&item_id)?))
}
