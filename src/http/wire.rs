//! JSON bodies shared by the server handlers and the HTTP client transport.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};

use crate::blockchain::types::ChainId;
use crate::confirmation::types::{ConfirmError, ConfirmRequest};

/// Header carrying the wallet address verified by the upstream auth layer.
pub const CALLER_HEADER: &str = "x-wallet-address";

/// Body of `POST /agents/{agent_id}/operations/{operation}/confirm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmBody {
    pub tx_hash: TxHash,
    pub chain_id: ChainId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_result_id: Option<u64>,
}

impl From<&ConfirmRequest> for ConfirmBody {
    fn from(request: &ConfirmRequest) -> Self {
        Self {
            tx_hash: request.tx_hash,
            chain_id: request.chain_id,
            client_result_id: request.client_result_id,
        }
    }
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Always `"error"`.
    pub status: String,
    pub error_kind: String,
    pub message: String,
    pub retryable: bool,
    /// The hash already confirmed, for conflicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicting_tx_hash: Option<TxHash>,
}

impl From<&ConfirmError> for ErrorBody {
    fn from(err: &ConfirmError) -> Self {
        Self {
            status: "error".to_string(),
            error_kind: err.kind().to_string(),
            message: err.user_message(),
            retryable: err.is_retryable(),
            conflicting_tx_hash: match err {
                ConfirmError::Conflict { existing } => Some(*existing),
                _ => None,
            },
        }
    }
}

impl ErrorBody {
    /// Rebuild the typed error on the client; `request` fills in what the
    /// wire format leaves out.
    pub fn into_error(self, request: &ConfirmRequest) -> ConfirmError {
        match self.error_kind.as_str() {
            "unauthorized" => ConfirmError::Unauthorized,
            "not_found" => ConfirmError::NotFound(request.entity_id.clone()),
            "conflict" => ConfirmError::Conflict {
                existing: self.conflicting_tx_hash.unwrap_or(TxHash::ZERO),
            },
            "transaction_failed" => ConfirmError::TransactionFailed(request.tx_hash),
            "service_unavailable" => ConfirmError::ServiceUnavailable(self.message),
            "identifier_not_found" => ConfirmError::IdentifierNotFound(request.tx_hash),
            "unsupported_chain" => ConfirmError::UnsupportedChain(request.chain_id),
            _ => ConfirmError::Internal(self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirmation::types::{EntityId, OperationType};

    fn request() -> ConfirmRequest {
        ConfirmRequest {
            entity_id: EntityId::new("agent-1"),
            operation: OperationType::Publish,
            tx_hash: TxHash::repeat_byte(0xaa),
            chain_id: ChainId(84532),
            client_result_id: None,
        }
    }

    #[test]
    fn test_body_field_names() {
        let body = ConfirmBody::from(&request());
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["chainId"], 84532);
        assert!(json.get("clientResultId").is_none());
        assert!(json["txHash"].as_str().unwrap().starts_with("0xaaaa"));
    }

    #[test]
    fn test_error_kinds_survive_the_wire() {
        let request = request();
        let errors = [
            ConfirmError::Unauthorized,
            ConfirmError::NotFound(request.entity_id.clone()),
            ConfirmError::Conflict {
                existing: TxHash::repeat_byte(0xbb),
            },
            ConfirmError::TransactionFailed(request.tx_hash),
            ConfirmError::IdentifierNotFound(request.tx_hash),
            ConfirmError::UnsupportedChain(request.chain_id),
        ];
        for err in errors {
            let body = ErrorBody::from(&err);
            assert_eq!(body.into_error(&request), err);
        }

        let body = ErrorBody::from(&ConfirmError::ServiceUnavailable("node lagging".into()));
        assert!(body.retryable);
        assert!(body.into_error(&request).is_retryable());
    }
}
