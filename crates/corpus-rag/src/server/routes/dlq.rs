//! Dead letter queue inspection endpoints

use axum::{extract::State, Json};

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::DlqStatsResponse;

/// GET /api/dlq/stats - counts by status
pub async fn dlq_stats(State(state): State<AppState>) -> Result<Json<DlqStatsResponse>> {
    let stats = state.dlq().stats()?;
    Ok(Json(DlqStatsResponse {
        pending: stats.pending,
        processing: stats.processing,
        failed: stats.failed,
        resolved: stats.resolved,
        total: stats.total,
    }))
}
