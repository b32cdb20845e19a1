/// Journal Service Library
///
/// Backend for the Nattie travel journal: microblog posts with rich-text
/// bodies and attached photos, filed under a shared catalogue of locations
/// and places.
///
/// # Modules
///
/// - `handlers`: HTTP request handlers
/// - `models`: Data structures for posts, locations, places
/// - `services`: Business logic (uploads, content normalization, storage diffing)
/// - `db`: Database access layer and repositories
/// - `middleware`: Session resolution from bearer tokens
/// - `error`: Error types and handling
/// - `config`: Configuration management
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
