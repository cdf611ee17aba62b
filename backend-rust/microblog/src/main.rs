mod api;
mod auth;
mod config;
mod error;
mod media;
mod models;
mod posts;
mod store;
mod users;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::io;
use std::sync::Arc;

use api::AppState;
use auth::AuthService;
use config::{Config, CorsConfig};
use media::{FileSystemMediaStorage, MediaService};
use posts::PostService;
use store::Store;
use users::UserService;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // Initialize store
    let store = Arc::new(Store::new(&config.store).map_err(|e| {
        log::error!("Failed to initialize database {}: {}", config.store.path, e);
        io::Error::new(io::ErrorKind::Other, e)
    })?);
    log::info!("Database: {}", config.store.path);

    let storage = Arc::new(FileSystemMediaStorage::new(&config.media)?);
    log::info!("Media directory: {}", storage.dir().display());

    let auth_service = Arc::new(AuthService::new(store.clone()));
    let state = web::Data::new(AppState {
        auth_service: auth_service.clone(),
        users: UserService::new(store.clone()),
        posts: PostService::new(store.clone()),
        media: MediaService::new(store.clone(), storage),
        max_upload_bytes: config.max_upload_bytes,
    });

    let cors_config = config.cors.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(build_cors(&cors_config))
            // AuthService is registered on its own for the CurrentUser extractor
            .app_data(web::Data::from(auth_service.clone()))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(config.max_upload_bytes))
            .configure(api::configure_routes)
    });

    log::info!("Starting microblog server on port {}", config.port);
    server.bind(("0.0.0.0", config.port))?.run().await
}

fn build_cors(config: &CorsConfig) -> Cors {
    let cors = if config.allowed_origins.is_empty() {
        Cors::default().allow_any_origin()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };

    cors.allow_any_method()
        .allow_any_header()
        .max_age(config.max_age)
}
