// Library entry point for microblog
// Exposes modules for testing

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod posts;
pub mod store;
pub mod users;
