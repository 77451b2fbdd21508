use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use greensteps_core::QuestDefinition;
use jiff::Timestamp;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::AppState;
use super::error::ApiResult;
use crate::store::{Badge, NewQuest, StoreError, UserBadge};

/// The effective coefficients alongside the keys overridden in the store.
pub(super) async fn factors(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let overrides = state.store.factors.all()?;
    let table = state.store.factors.table()?;
    let effective: BTreeMap<&str, f64> = table.iter().collect();
    let overridden: Vec<&str> = overrides.iter().map(|(key, _)| key.as_str()).collect();
    Ok(Json(json!({
        "factors": effective,
        "overridden": overridden,
    })))
}

#[derive(Debug, Deserialize)]
pub(super) struct FactorBody {
    value: f64,
}

pub(super) async fn set_factor(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Result<Json<FactorBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    state.store.factors.set(&key, body.value)?;
    info!(target: "http", %key, value = body.value, "emission factor set");
    Ok(Json(json!({ "key": key, "value": body.value })))
}

pub(super) async fn remove_factor(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.store.factors.remove(&key)? {
        return Err(StoreError::NotFound(format!("factor {key}")).into());
    }
    info!(target: "http", %key, "emission factor override removed");
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn create_quest(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewQuest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<QuestDefinition>)> {
    let Json(quest) = body?;
    Ok((StatusCode::CREATED, Json(state.store.quests.create_quest(quest)?)))
}

pub(super) async fn badges(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Badge>>> {
    Ok(Json(state.store.badges.all()?))
}

pub(super) async fn create_badge(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Badge>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Badge>)> {
    let Json(badge) = body?;
    Ok((StatusCode::CREATED, Json(state.store.badges.create(badge)?)))
}

#[derive(Debug, Deserialize)]
pub(super) struct AwardBody {
    user_id: String,
}

pub(super) async fn award_badge(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    body: Result<Json<AwardBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserBadge>)> {
    let Json(body) = body?;
    let award = state
        .store
        .badges
        .award(body.user_id.trim(), &code, Timestamp::now())?;
    Ok((StatusCode::CREATED, Json(award)))
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use crate::http::testing::spawn_app;

    #[tokio::test]
    async fn admin_requires_basic_auth() {
        let app = spawn_app("[admin]\npassword = \"pw\"").await;
        let res = app.client.get(app.url("/admin/factors")).send().await.unwrap();
        assert_eq!(res.status(), 401);
        assert_eq!(res.headers()["www-authenticate"], "Basic realm=\"admin\"");

        for password in ["wrong", "p", "pww"] {
            let res = app
                .client
                .get(app.url("/admin/factors"))
                .basic_auth("greensteps", Some(password))
                .send()
                .await
                .unwrap();
            assert_eq!(res.status(), 401, "{password}");
        }

        let res = app
            .client
            .get(app.url("/admin/factors"))
            .basic_auth("greensteps", Some("pw"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["factors"]["energy.electricity.kwh.au-vic"], 2.07292);
        assert_eq!(body["overridden"], json!([]));
    }

    #[tokio::test]
    async fn admin_disabled_without_password() {
        let app = spawn_app("").await;
        let res = app
            .client
            .get(app.url("/admin/factors"))
            .basic_auth("greensteps", Some(""))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 401);
    }

    #[tokio::test]
    async fn factor_overrides() {
        let app = spawn_app("[admin]\npassword = \"pw\"").await;
        let put = |value: Value| {
            app.client
                .put(app.url("/admin/factors/waste.mixed.kg"))
                .basic_auth("greensteps", Some("pw"))
                .json(&value)
                .send()
        };
        assert_eq!(put(json!({"value": 0.7})).await.unwrap().status(), 200);
        assert_eq!(put(json!({"value": -2})).await.unwrap().status(), 400);

        let body: Value = app
            .client
            .get(app.url("/admin/factors"))
            .basic_auth("greensteps", Some("pw"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["factors"]["waste.mixed.kg"], 0.7);
        assert_eq!(body["overridden"], json!(["waste.mixed.kg"]));

        let delete = || {
            app.client
                .delete(app.url("/admin/factors/waste.mixed.kg"))
                .basic_auth("greensteps", Some("pw"))
                .send()
        };
        assert_eq!(delete().await.unwrap().status(), 204);
        assert_eq!(delete().await.unwrap().status(), 404);
    }
}
