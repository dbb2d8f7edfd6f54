use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::{header, Method},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use daybook_shared::api::{
    CreateEntryRequest, DeleteAllResponse, EntryListResponse, EntryResponse, ProfileResponse,
    ProfileUpdate, SuccessResponse,
};
use daybook_shared::dates::{format_timestamp, parse_entry_date};
use daybook_shared::EntryId;
use daybook_store::{DiaryEntry, UserProfile};

use crate::admission::Admission;
use crate::auth::{self, AuthUser};
use crate::db::StoreHandle;
use crate::deletion::EntryRemover;
use crate::error::ServerError;
use crate::image_host::{ImageHostError, LocalImageHost};
use crate::pipeline::EntryPipeline;
use crate::rate_limit::admission_gate;
use crate::session::SessionKeys;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub sessions: Arc<SessionKeys>,
    pub admission: Admission,
    pub pipeline: Arc<EntryPipeline>,
    pub remover: Arc<EntryRemover>,
    /// Present when images are hosted by this process.
    pub local_images: Option<Arc<LocalImageHost>>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let api = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/entries",
            get(list_entries).post(create_entry).delete(delete_all_entries),
        )
        .route("/api/entries/:id", axum::routing::delete(delete_entry))
        .route("/api/user/profile", get(get_profile).post(update_profile))
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(middleware::from_fn_with_state(state.clone(), admission_gate));

    Router::new()
        .route("/health", get(health_check))
        .route("/images/:name", get(serve_image))
        .merge(api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn serve_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let host = state.local_images.as_ref().ok_or(ServerError::NotFound)?;
    let data = host.read(&name).await.map_err(|e| match e {
        ImageHostError::NotFound(_) | ImageHostError::InvalidName(_) => ServerError::NotFound,
        other => ServerError::Internal(other.to_string()),
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        data,
    ))
}

// ─── Entries ───

fn format_entry(entry: DiaryEntry) -> EntryResponse {
    EntryResponse {
        id: entry.id.to_string(),
        entry_date: format_timestamp(&entry.entry_date),
        created_at: format_timestamp(&entry.created_at),
        content: entry.content,
        title: entry.title,
        image_url: entry.image_url,
        image_prompt: entry.image_prompt,
        stylized_content: entry.stylized_content,
        author_style: entry.author_style,
    }
}

async fn create_entry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreateEntryRequest>, JsonRejection>,
) -> Result<Json<EntryResponse>, ServerError> {
    let Json(req) = payload.map_err(|e| ServerError::MalformedBody(e.body_text()))?;
    let content = req.validated_content()?;
    let entry_date = req
        .entry_date
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(parse_entry_date)
        .transpose()?;

    let entry = state.pipeline.create(user, content, entry_date).await?;
    Ok(Json(format_entry(entry)))
}

async fn list_entries(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<EntryListResponse>, ServerError> {
    let entries = state
        .store
        .call(move |db| db.list_entries_for_user(user))
        .await?;

    Ok(Json(EntryListResponse {
        entries: entries.into_iter().map(format_entry).collect(),
    }))
}

async fn delete_entry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ServerError> {
    let id: EntryId = id.parse().map_err(|_| ServerError::EntryNotFound)?;
    state.remover.remove_one(user, id).await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn delete_all_entries(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<DeleteAllResponse>, ServerError> {
    let deleted_count = state.remover.remove_all(user).await?;
    Ok(Json(DeleteAllResponse {
        success: true,
        deleted_count,
    }))
}

// ─── Profile ───

async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ProfileResponse>, ServerError> {
    let profile = state
        .store
        .call(move |db| db.get_profile(user))
        .await?
        .unwrap_or_else(|| UserProfile::empty(user));

    Ok(Json(ProfileResponse {
        user_id: user.to_string(),
        gender: profile.gender,
        age_range: profile.age_range,
        ethnicity: profile.ethnicity,
    }))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ServerError> {
    let Json(update) = payload.map_err(|e| ServerError::MalformedBody(e.body_text()))?;
    let (gender, age_range, ethnicity) = update.validated()?;

    let profile = UserProfile {
        user_id: user,
        gender,
        age_range,
        ethnicity,
        updated_at: chrono::Utc::now(),
    };
    state
        .store
        .call(move |db| db.upsert_profile(&profile))
        .await?;

    info!(user = %user, "Updated profile");
    Ok(Json(SuccessResponse::ok()))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
