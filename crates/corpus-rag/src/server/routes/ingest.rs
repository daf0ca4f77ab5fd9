//! Ingest endpoints: file upload and web crawl

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingestion::RawSource;
use crate::processing::SubmitOutcome;
use crate::server::state::AppState;
use crate::types::{
    response::{IngestError, IngestResponse, SkippedSource},
    CrawlRequest, IngestAccepted,
};

/// POST /api/ingest - upload files; processing continues in the background
pub async fn ingest_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IngestResponse>)> {
    let mut response = IngestResponse::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Internal(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("upload_{}", Uuid::new_v4()));

        let data = match field.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                response.errors.push(IngestError {
                    name,
                    error: format!("Failed to read upload: {}", e),
                });
                continue;
            }
        };

        tracing::info!("Upload received: {} ({} bytes)", name, data.len());

        match state
            .queue()
            .submit(RawSource::FileBytes { name: name.clone(), data })
            .await
        {
            Ok(SubmitOutcome::Accepted(doc)) => response.accepted.push(IngestAccepted {
                document_id: doc.id,
                status: doc.status,
                name: doc.name,
            }),
            Ok(SubmitOutcome::Skipped { reason, existing }) => {
                response.skipped.push(SkippedSource {
                    name,
                    reason,
                    existing_document_id: existing.id,
                })
            }
            Err(e) => response.errors.push(IngestError {
                name,
                error: e.to_string(),
            }),
        }
    }

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /api/crawl - register a web page for ingestion
pub async fn crawl_url(
    State(state): State<AppState>,
    Json(request): Json<CrawlRequest>,
) -> Result<(StatusCode, Json<IngestResponse>)> {
    let url = request.url.trim().to_string();
    if url.is_empty() {
        return Err(Error::Config("url must not be empty".to_string()));
    }

    tracing::info!("Crawl requested: {}", url);

    let mut response = IngestResponse::default();
    match state
        .queue()
        .submit(RawSource::Url { url: url.clone() })
        .await?
    {
        SubmitOutcome::Accepted(doc) => response.accepted.push(IngestAccepted {
            document_id: doc.id,
            status: doc.status,
            name: doc.name,
        }),
        SubmitOutcome::Skipped { reason, existing } => response.skipped.push(SkippedSource {
            name: url,
            reason,
            existing_document_id: existing.id,
        }),
    }

    Ok((StatusCode::ACCEPTED, Json(response)))
}
