//! Confirmation endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};

use crate::confirmation::types::{ConfirmError, ConfirmRequest, EntityId, OperationType};
use crate::http::middleware::Caller;
use crate::http::server::AppState;
use crate::http::wire::{ConfirmBody, ErrorBody};

impl IntoResponse for ConfirmError {
    fn into_response(self) -> Response {
        let status = match &self {
            ConfirmError::Unauthorized => StatusCode::UNAUTHORIZED,
            ConfirmError::NotFound(_) => StatusCode::NOT_FOUND,
            ConfirmError::Conflict { .. } => StatusCode::CONFLICT,
            ConfirmError::TransactionFailed(_) | ConfirmError::IdentifierNotFound(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ConfirmError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ConfirmError::UnsupportedChain(_) => StatusCode::BAD_REQUEST,
            ConfirmError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

/// `POST /agents/{agent_id}/operations/{operation}/confirm`
pub async fn confirm_handler(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path((agent_id, operation)): Path<(String, OperationType)>,
    Json(body): Json<ConfirmBody>,
) -> Response {
    let request = ConfirmRequest {
        entity_id: EntityId::new(agent_id),
        operation,
        tx_hash: body.tx_hash,
        chain_id: body.chain_id,
        client_result_id: body.client_result_id,
    };

    match state.coordinator.confirm(caller, &request).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /agents/{agent_id}/operations/{operation}`
pub async fn state_handler(
    State(state): State<AppState>,
    Path((agent_id, operation)): Path<(String, OperationType)>,
) -> Response {
    match state.coordinator.state(&EntityId::new(agent_id), operation).await {
        Ok(current) => Json(current).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::TxHash;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ConfirmError::Unauthorized, 401),
            (ConfirmError::NotFound(EntityId::new("a")), 404),
            (ConfirmError::Conflict { existing: TxHash::ZERO }, 409),
            (ConfirmError::TransactionFailed(TxHash::ZERO), 422),
            (ConfirmError::ServiceUnavailable("lagging".into()), 503),
            (ConfirmError::IdentifierNotFound(TxHash::ZERO), 422),
            (ConfirmError::UnsupportedChain(crate::blockchain::types::ChainId(7)), 400),
            (ConfirmError::Internal("disk".into()), 500),
        ];
        for (err, code) in cases {
            assert_eq!(err.into_response().status().as_u16(), code);
        }
    }
}
