use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthService, CurrentUser};
use crate::error::{AppError, AppResult};
use crate::media::MediaService;
use crate::models::{PublishRequest, SignUpRequest};
use crate::posts::PostService;
use crate::users::UserService;

pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub users: UserService,
    pub posts: PostService,
    pub media: MediaService,
    pub max_upload_bytes: usize,
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Users Endpoints ====================

pub async fn sign_up(
    state: web::Data<AppState>,
    body: web::Json<SignUpRequest>,
) -> AppResult<HttpResponse> {
    let user = state.auth_service.sign_up(&body)?;
    Ok(HttpResponse::Created().json(user))
}

pub async fn get_current_user(
    state: web::Data<AppState>,
    current: CurrentUser,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.users.get_profile(&current.0)))
}

pub async fn get_user(
    state: web::Data<AppState>,
    _current: CurrentUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let profile = state.users.get_user_by_id(&path.into_inner().to_string())?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn follow(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    state
        .users
        .follow(&path.into_inner().to_string(), current.id())?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn unfollow(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    state
        .users
        .unfollow(&path.into_inner().to_string(), current.id())?;
    Ok(HttpResponse::NoContent().finish())
}

// ==================== Posts Endpoints ====================

pub async fn list_feed(
    state: web::Data<AppState>,
    current: CurrentUser,
) -> AppResult<HttpResponse> {
    let posts = state.posts.list_feed(current.id())?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn publish(
    state: web::Data<AppState>,
    current: CurrentUser,
    body: web::Json<PublishRequest>,
) -> AppResult<HttpResponse> {
    let post = state.posts.publish(current.id(), &body)?;
    Ok(HttpResponse::Created().json(post))
}

pub async fn remove_post(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    state
        .posts
        .remove(&path.into_inner().to_string(), current.id())?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn like(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    state.posts.like(&path.into_inner().to_string(), current.id())?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn unlike(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    state
        .posts
        .unlike(&path.into_inner().to_string(), current.id())?;
    Ok(HttpResponse::NoContent().finish())
}

// ==================== Media Endpoints ====================

/// Accepts a multipart form with a `file` field; other fields are ignored
pub async fn upload_media(
    state: web::Data<AppState>,
    _current: CurrentUser,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::Validation(vec![e.to_string()]))?;

        let disposition = field.content_disposition();
        if disposition.and_then(|cd| cd.get_name()) != Some("file") {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| AppError::Validation(vec![e.to_string()]))?;
            }
            continue;
        }
        let filename = disposition
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::Validation(vec![e.to_string()]))?;
            if bytes.len() + chunk.len() > state.max_upload_bytes {
                return Err(AppError::Validation(vec![format!(
                    "file exceeds {} bytes",
                    state.max_upload_bytes
                )]));
            }
            bytes.extend_from_slice(&chunk);
        }

        let media = state.media.save(&bytes, &filename)?;
        return Ok(HttpResponse::Created().json(media));
    }

    Err(AppError::Validation(vec!["file is required".to_string()]))
}

// ==================== Route Configuration ====================

fn validation_error(message: String, _req: &HttpRequest) -> actix_web::Error {
    AppError::Validation(vec![message]).into()
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, req| validation_error(err.to_string(), req)),
    )
    .app_data(
        web::PathConfig::default().error_handler(|err, req| validation_error(err.to_string(), req)),
    )
    // Health check
    .route("/health", web::get().to(health))
    // Users
    .route("/api/users", web::post().to(sign_up))
    .route("/api/users/me", web::get().to(get_current_user))
    .route("/api/users/{id}", web::get().to(get_user))
    .route("/api/users/{id}/follows", web::post().to(follow))
    .route("/api/users/{id}/follows", web::delete().to(unfollow))
    // Posts
    .route("/api/posts", web::get().to(list_feed))
    .route("/api/posts", web::post().to(publish))
    .route("/api/posts/{id}", web::delete().to(remove_post))
    .route("/api/posts/{id}/likes", web::post().to(like))
    .route("/api/posts/{id}/likes", web::delete().to(unlike))
    // Media
    .route("/api/medias", web::post().to(upload_media));
}
