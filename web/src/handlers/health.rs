//! Liveness endpoint.

use axum::Json;
use serde::{Deserialize, Serialize};

/// Liveness body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"` when the process can answer.
    pub status: String,
}

/// Liveness probe. Touches no store, so a degraded database still answers.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// { "status": "healthy" }
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_healthy() {
        let Json(body) = health_check().await;
        assert_eq!(body.status, "healthy");
    }
}
