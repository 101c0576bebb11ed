use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::Connection;
use tracing::{error, info_span, Instrument};
use utoipa::ToSchema;

use super::auth::SharedAuth;
use crate::{auth::Backend, GIT_COMMIT_HASH};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    store: String,
    database: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and credential store are healthy", body = Health),
        (status = 503, description = "Credential store is unreachable", body = Health)
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(auth: Extension<SharedAuth>) -> impl IntoResponse {
    let store = auth.sessions.store();
    let database = match store.as_ref() {
        Backend::Memory(_) => "n/a",
        Backend::Postgres(pg) => {
            let acquire_span = info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            );
            match pg.pool().acquire().instrument(acquire_span).await {
                Ok(mut conn) => {
                    let ping_span =
                        info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
                    match conn.ping().instrument(ping_span).await {
                        Ok(()) => "ok",
                        Err(err) => {
                            error!("Failed to ping database: {err}");
                            "error"
                        }
                    }
                }
                Err(err) => {
                    error!("Failed to acquire database connection: {err}");
                    "error"
                }
            }
        }
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store.kind().to_string(),
        database: database.to_string(),
    };

    let short_hash = GIT_COMMIT_HASH.get(0..7).unwrap_or_default();
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!(
        "{}:{}:{short_hash}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )) {
        headers.insert("X-App", value);
    }

    let status = if database == "error" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, headers, Json(health))
}
