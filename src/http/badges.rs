use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use super::AppState;
use super::auth::Requester;
use super::error::ApiResult;
use crate::store::UserBadge;

pub(super) async fn earned(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
) -> ApiResult<Json<Vec<UserBadge>>> {
    Ok(Json(state.store.badges.for_user(&user)?))
}
