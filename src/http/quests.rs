use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use jiff::Timestamp;
use serde::Deserialize;

use super::AppState;
use super::auth::Requester;
use super::error::ApiResult;
use crate::store::{QuestBoard, UserQuestView};

pub(super) async fn board(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
) -> ApiResult<Json<QuestBoard>> {
    Ok(Json(state.store.quests.board(&user)?))
}

pub(super) async fn enroll(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    Path(quest_id): Path<String>,
) -> ApiResult<(StatusCode, Json<UserQuestView>)> {
    let view = state.store.quests.enroll(&user, &quest_id, Timestamp::now())?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub(super) struct ProgressBody {
    #[serde(default = "one")]
    delta: f64,
}

fn one() -> f64 {
    1.0
}

/// An empty body counts as a single step.
pub(super) async fn progress(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    Path(id): Path<String>,
    body: Result<Json<ProgressBody>, JsonRejection>,
) -> ApiResult<Json<UserQuestView>> {
    let delta = match body {
        Ok(Json(body)) => body.delta,
        Err(JsonRejection::MissingJsonContentType(_)) => one(),
        Err(rejection) => return Err(rejection.into()),
    };
    Ok(Json(state.store.quests.increment(&user, &id, delta, Timestamp::now())?))
}

pub(super) async fn cancel(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.quests.cancel(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use crate::http::testing::spawn_app;

    #[tokio::test]
    async fn enroll_progress_complete() {
        let app = spawn_app("[admin]\npassword = \"pw\"").await;
        let res = app
            .client
            .post(app.url("/admin/quests"))
            .basic_auth("greensteps", Some("pw"))
            .json(&json!({"name": "Ride the tram", "max_value": 3, "points_multiplier": 5}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);
        let quest: Value = res.json().await.unwrap();
        let quest_id = quest["id"].as_str().unwrap().to_string();

        let board: Value = app.get("ana", "/api/quests").send().await.unwrap().json().await.unwrap();
        assert_eq!(board["discover"][0]["id"], quest_id);

        let res = app
            .post("ana", &format!("/api/quests/{quest_id}/enroll"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);
        let enrolment: Value = res.json().await.unwrap();
        let id = enrolment["id"].as_str().unwrap().to_string();
        let res = app
            .post("ana", &format!("/api/quests/{quest_id}/enroll"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 409);

        let step: Value = app
            .post("ana", &format!("/api/user-quests/{id}/progress"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(step["progress"], 1.0);
        assert_eq!(step["percent"], 33);

        let done: Value = app
            .post("ana", &format!("/api/user-quests/{id}/progress"))
            .json(&json!({"delta": 2}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(done["completed"], true);
        assert_eq!(done["awarded_points"], 15);

        let board: Value = app.get("ana", "/api/quests").send().await.unwrap().json().await.unwrap();
        assert_eq!(board["completed"][0]["id"], id);
        assert_eq!(board["discover"], json!([]));

        let profile: Value = app.get("ana", "/api/profile").send().await.unwrap().json().await.unwrap();
        assert_eq!(profile["total_points"], 15);

        let res = app
            .post("ana", &format!("/api/user-quests/{id}/progress"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 409);

        let res = app.delete("ana", &format!("/api/user-quests/{id}")).send().await.unwrap();
        assert_eq!(res.status(), 409);
        let res = app
            .post("ana", &format!("/api/quests/{quest_id}/enroll"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 409);
    }

    #[tokio::test]
    async fn cancel_enrolment() {
        let app = spawn_app("[admin]\npassword = \"pw\"").await;
        let quest: Value = app
            .client
            .post(app.url("/admin/quests"))
            .basic_auth("greensteps", Some("pw"))
            .json(&json!({"name": "Compost", "max_value": 2}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let quest_id = quest["id"].as_str().unwrap();
        let enrolment: Value = app
            .post("ana", &format!("/api/quests/{quest_id}/enroll"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = enrolment["id"].as_str().unwrap();

        let res = app.delete("ben", &format!("/api/user-quests/{id}")).send().await.unwrap();
        assert_eq!(res.status(), 404);
        let res = app.delete("ana", &format!("/api/user-quests/{id}")).send().await.unwrap();
        assert_eq!(res.status(), 204);
        let res = app.delete("ana", "/api/user-quests/nope").send().await.unwrap();
        assert_eq!(res.status(), 400);
        let res = app.post("ana", "/api/quests/nope/enroll").send().await.unwrap();
        assert_eq!(res.status(), 400);
    }
}
