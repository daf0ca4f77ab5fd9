//! Search and answer endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::server::state::AppState;
use crate::types::{SearchRequest, SearchResponse};

/// POST /api/search - ranked passages for a query
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Json<SearchResponse> {
    let start = Instant::now();
    let top_k = request
        .top_k
        .unwrap_or(state.config().retrieval.default_top_k);

    tracing::info!("Search: \"{}\" (top_k {})", request.query, top_k);

    let (passages, from_cache) = state.retriever().search(&request.query, top_k).await;

    Json(SearchResponse {
        query: request.query,
        passages,
        from_cache,
        processing_time_ms: start.elapsed().as_millis() as u64,
    })
}

/// POST /api/answer request body
#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// POST /api/answer response body
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub context_used: bool,
    pub passages: Vec<crate::types::RankedPassage>,
    pub processing_time_ms: u64,
}

/// POST /api/answer - generate an answer from retrieved context
pub async fn answer(
    State(state): State<AppState>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>> {
    let llm = state
        .llm()
        .ok_or_else(|| Error::Llm("answer generation is not enabled".to_string()))?;

    let start = Instant::now();
    let top_k = request
        .top_k
        .unwrap_or(state.config().retrieval.default_top_k);

    let (passages, _) = state.retriever().search(&request.query, top_k).await;
    let context = PromptBuilder::build_context(&passages);
    let prompt = PromptBuilder::build_prompt(&request.query, &context);

    let answer = llm
        .generate(&prompt, Some(PromptBuilder::system_prompt()))
        .await?;

    Ok(Json(AnswerResponse {
        answer,
        context_used: !context.is_empty(),
        passages,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
