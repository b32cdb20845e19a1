/// Business logic layer for journal-service
pub mod facts;
pub mod filename;
pub mod locations;
pub mod media;
pub mod posts;
pub mod rich_text;
pub mod storage;
pub mod storage_diff;
pub mod upload;

pub use facts::{FactsClient, FactsGenerator};
pub use locations::LocationService;
pub use posts::PostService;
