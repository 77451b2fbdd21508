use std::collections::HashSet;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use greensteps_core::Scope;
use greensteps_core::ranking::ANONYMOUS;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::AppState;
use super::auth::Requester;
use super::error::{ApiError, ApiResult};
use crate::leaderboard::{Leaderboard, leaderboard as build_leaderboard};
use crate::store::{FriendRequest, FriendStatus, Profile, ProfileUpdate, StoreError};

const MIN_SEARCH_LEN: usize = 2;
const MAX_SEARCH_RESULTS: usize = 20;

pub(super) async fn get_profile(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
) -> ApiResult<Json<Profile>> {
    match state.store.profiles.find_one(&user)? {
        Some(profile) => Ok(Json(profile)),
        None => Err(StoreError::NotFound("profile".to_string()).into()),
    }
}

pub(super) async fn put_profile(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<Profile>> {
    let Json(update) = body?;
    Ok(Json(state.store.profiles.upsert(&user, update)?))
}

pub(super) async fn onboarding(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
) -> ApiResult<Json<Value>> {
    let completed = state
        .store
        .profiles
        .find_one(&user)?
        .is_some_and(|p| p.onboarding_completed);
    Ok(Json(json!({ "completed": completed })))
}

#[derive(Debug, Deserialize)]
pub(super) struct LeaderboardQuery {
    scope: Option<String>,
    limit: Option<usize>,
}

pub(super) async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    query: Result<Query<LeaderboardQuery>, QueryRejection>,
) -> ApiResult<Json<Leaderboard>> {
    let Query(query) = query?;
    let scope = match query.scope.as_deref() {
        None | Some("") => Scope::default(),
        Some(scope) => scope.parse().map_err(ApiError::BadRequest)?,
    };
    let limit = state.config.leaderboard.clamp(query.limit);
    Ok(Json(build_leaderboard(&state.store, &user, scope, limit)?))
}

/// Another user as shown in friend lists.
#[derive(Debug, Serialize)]
pub(super) struct FriendView {
    id: String,
    display_name: String,
    avatar_url: Option<String>,
    total_points: i64,
    since: Timestamp,
}

#[derive(Debug, Default, Serialize)]
pub(super) struct FriendLists {
    friends: Vec<FriendView>,
    incoming: Vec<FriendView>,
    outgoing: Vec<FriendView>,
}

pub(super) async fn list_friends(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
) -> ApiResult<Json<FriendLists>> {
    let relations = state.store.friends.relations(&user)?;
    let profiles = state
        .store
        .profiles
        .find_many(relations.iter().map(|r| r.other(&user)))?;
    let view = |request: &FriendRequest| {
        let other = request.other(&user);
        let profile = profiles.iter().find(|p| p.id == other);
        FriendView {
            id: other.to_string(),
            display_name: profile
                .and_then(|p| p.display_name.clone())
                .unwrap_or_else(|| ANONYMOUS.to_string()),
            avatar_url: profile.and_then(|p| p.avatar_url.clone()),
            total_points: profile.map_or(0, |p| p.total_points),
            since: request.created_at,
        }
    };
    let mut lists = FriendLists::default();
    for request in &relations {
        let list = match request.status {
            FriendStatus::Accepted => &mut lists.friends,
            FriendStatus::Pending if request.recipient == user => &mut lists.incoming,
            FriendStatus::Pending => &mut lists.outgoing,
        };
        list.push(view(request));
    }
    Ok(Json(lists))
}

#[derive(Debug, Deserialize)]
pub(super) struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SearchResult {
    id: String,
    display_name: String,
    avatar_url: Option<String>,
    already_friend: bool,
}

pub(super) async fn search_friends(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<SearchResult>>> {
    let Query(query) = query?;
    let term = query.q.trim();
    if term.chars().count() < MIN_SEARCH_LEN {
        return Ok(Json(vec![]));
    }
    let related: HashSet<String> = state
        .store
        .friends
        .relations(&user)?
        .iter()
        .map(|r| r.other(&user).to_string())
        .collect();
    let results = state
        .store
        .profiles
        .search(term, &user, MAX_SEARCH_RESULTS)?
        .into_iter()
        .map(|profile: Profile| SearchResult {
            already_friend: related.contains(&profile.id),
            display_name: profile.display_name.unwrap_or_else(|| ANONYMOUS.to_string()),
            avatar_url: profile.avatar_url,
            id: profile.id,
        })
        .collect();
    Ok(Json(results))
}

pub(super) async fn request_friend(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let outcome = state.store.friends.request(&user, &id, Timestamp::now())?;
    Ok((StatusCode::CREATED, Json(json!({ "status": outcome }))))
}

pub(super) async fn accept_friend(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    Path(id): Path<String>,
) -> ApiResult<Json<FriendRequest>> {
    Ok(Json(state.store.friends.accept(&user, &id)?))
}

pub(super) async fn decline_friend(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.friends.decline(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn remove_friend(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.friends.remove(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
