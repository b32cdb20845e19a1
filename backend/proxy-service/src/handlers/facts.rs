/// Useless-facts proxy handler
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};
use crate::facts::parse_facts;
use crate::handlers::ProxyState;

#[derive(Debug, Default, Deserialize)]
pub struct FactsRequest {
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FactsResponse {
    pub facts: Vec<String>,
}

/// POST /generate-useless-facts
pub async fn generate_useless_facts(
    state: web::Data<ProxyState>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let req = serde_json::from_slice::<FactsRequest>(&body).unwrap_or_default();
    let prompt = req
        .prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or(ProxyError::MissingParameter("prompt"))?;

    let generator = state.facts.as_ref().ok_or(ProxyError::NotConfigured)?;
    let raw = generator.generate_text(prompt).await?;

    let facts = parse_facts(&raw);
    if facts.is_empty() {
        tracing::warn!(raw_len = raw.len(), "model output contained no bullet lines");
    }
    Ok(HttpResponse::Ok().json(FactsResponse { facts }))
}
