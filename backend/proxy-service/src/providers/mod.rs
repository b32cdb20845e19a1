//! Upstream API providers

pub mod gemini;
pub mod google_places;

pub use gemini::{GeminiClient, TextGenerator};
pub use google_places::{GooglePlacesClient, PlacePhoto, PlacesProvider};
