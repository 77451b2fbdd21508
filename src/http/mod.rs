mod activities;
mod admin;
mod auth;
mod badges;
mod error;
mod quests;
mod social;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use jiff::Timestamp;
use jiff::tz::TimeZone;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use crate::config::Config;
use crate::store::Store;

use self::error::ApiResult;

/// Everything a request handler may touch. Built once at startup.
pub(crate) struct AppState {
    pub(crate) config: Config,
    pub(crate) store: Store,
    pub(crate) time_zone: TimeZone,
}

impl AppState {
    pub(crate) fn new(config: Config, store: Store) -> Result<AppState> {
        let time_zone = config.summary.zone()?;
        Ok(AppState {
            config,
            store,
            time_zone,
        })
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/emissions", post(activities::compute))
        .route("/activities", post(activities::create).get(activities::list))
        .route("/summary", get(activities::summary))
        .route("/streak", get(activities::streak))
        .route("/profile", get(social::get_profile).put(social::put_profile))
        .route("/onboarding", get(social::onboarding))
        .route("/leaderboard", get(social::leaderboard))
        .route("/friends", get(social::list_friends))
        .route("/friends/search", get(social::search_friends))
        .route(
            "/friends/{id}",
            post(social::request_friend).delete(social::remove_friend),
        )
        .route("/friends/{id}/accept", post(social::accept_friend))
        .route("/friends/{id}/decline", post(social::decline_friend))
        .route("/quests", get(quests::board))
        .route("/quests/{quest_id}/enroll", post(quests::enroll))
        .route("/user-quests/{id}/progress", post(quests::progress))
        .route("/user-quests/{id}", delete(quests::cancel))
        .route("/badges", get(badges::earned))
        .route_layer(from_fn_with_state(state.clone(), auth::require_user));
    let admin = Router::new()
        .route("/factors", get(admin::factors))
        .route(
            "/factors/{key}",
            put(admin::set_factor).delete(admin::remove_factor),
        )
        .route("/quests", post(admin::create_quest))
        .route("/badges", get(admin::badges).post(admin::create_badge))
        .route("/badges/{code}/awards", post(admin::award_badge))
        .route_layer(from_fn_with_state(state.clone(), auth::admin_basic_auth));
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(Any);
    Router::new()
        .route("/health", get(health))
        .route("/ping", get(ping))
        .nest("/api", api)
        .nest("/admin", admin)
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
        .with_state(state)
}

pub(crate) async fn serve(
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let address = format!("{}:{}", state.config.server.bind, state.config.server.http_port);
    let listener = TcpListener::bind(&address).await?;
    info!(target: "http", %address, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Timestamp::now().to_string(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ping(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    state.store.ping()?;
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use tempfile::TempDir;
    use tokio::net::TcpListener;

    use super::{AppState, router};
    use crate::config::Config;
    use crate::store::testing::temp_store;

    pub(crate) struct TestApp {
        pub(crate) base: String,
        pub(crate) state: Arc<AppState>,
        pub(crate) client: reqwest::Client,
        _dir: TempDir,
    }

    impl TestApp {
        pub(crate) fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }
        pub(crate) fn get(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
            self.client.get(self.url(path)).header("x-user-id", user)
        }
        pub(crate) fn post(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
            self.client.post(self.url(path)).header("x-user-id", user)
        }
        pub(crate) fn put(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
            self.client.put(self.url(path)).header("x-user-id", user)
        }
        pub(crate) fn delete(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
            self.client.delete(self.url(path)).header("x-user-id", user)
        }
    }

    /// Serves the full router on an ephemeral port.
    pub(crate) async fn spawn_app(config_toml: &str) -> TestApp {
        let (dir, store) = temp_store();
        let config = Config::parse(config_toml).unwrap();
        let state = Arc::new(AppState::new(config, store).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        TestApp {
            base,
            state,
            client: reqwest::Client::new(),
            _dir: dir,
        }
    }
}
