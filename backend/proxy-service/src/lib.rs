//! Proxy Service Library
//!
//! Keeps third-party API keys off the client: place autocomplete, details and
//! photos are relayed to Google Places, and "useless facts" prompts are sent
//! to Gemini with the model output reduced to at most three bullet lines.

pub mod config;
pub mod cors;
pub mod error;
pub mod facts;
pub mod handlers;
pub mod providers;

pub use config::Config;
pub use error::{ProxyError, Result};
