/// Useless-facts generation for post drafts
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::services::FactsGenerator;

#[derive(Debug, Deserialize)]
pub struct GenerateFactsRequest {
    pub location: String,
    pub place: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateFactsResponse {
    pub facts: Vec<String>,
}

/// POST /api/v1/facts
pub async fn generate_facts(
    generator: web::Data<Arc<dyn FactsGenerator>>,
    req: web::Json<GenerateFactsRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let facts = generator.generate(req.location, req.place).await?;
    Ok(HttpResponse::Ok().json(GenerateFactsResponse { facts }))
}
