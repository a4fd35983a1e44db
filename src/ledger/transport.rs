//! How the client reaches the confirmation coordinator.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;

use crate::confirmation::coordinator::ConfirmationCoordinator;
use crate::confirmation::types::{
    ConfirmError, ConfirmOutcome, ConfirmRequest, ConfirmationState, EntityId, OperationType,
};
use crate::http::wire::{ConfirmBody, ErrorBody, CALLER_HEADER};

#[async_trait]
pub trait ConfirmTransport: Send + Sync {
    async fn confirm(&self, request: &ConfirmRequest) -> Result<ConfirmOutcome, ConfirmError>;
}

/// Calls a coordinator in the same process as a fixed caller.
pub struct LocalTransport {
    coordinator: Arc<ConfirmationCoordinator>,
    caller: Address,
}

impl LocalTransport {
    pub fn new(coordinator: Arc<ConfirmationCoordinator>, caller: Address) -> Self {
        Self { coordinator, caller }
    }
}

#[async_trait]
impl ConfirmTransport for LocalTransport {
    async fn confirm(&self, request: &ConfirmRequest) -> Result<ConfirmOutcome, ConfirmError> {
        self.coordinator.confirm(Some(self.caller), request).await
    }
}

/// Calls the confirmation service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: url::Url,
    caller: Address,
}

impl HttpTransport {
    /// `timeout` should exceed the server's confirmation deadline.
    pub fn new(base_url: url::Url, caller: Address, timeout: Duration) -> Result<Self, ConfirmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfirmError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            caller,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<url::Url, ConfirmError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ConfirmError::Internal(format!("'{}' cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Read the server's confirmation state for one operation.
    pub async fn state(
        &self,
        entity_id: &EntityId,
        operation: OperationType,
    ) -> Result<ConfirmationState, ConfirmError> {
        let url = self.url(&["agents", &entity_id.0, "operations", operation.as_str()])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ConfirmError::ServiceUnavailable(e.to_string()))?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| ConfirmError::Internal(format!("Malformed state response: {}", e)))
        } else if response.status() == reqwest::StatusCode::NOT_FOUND {
            Err(ConfirmError::NotFound(entity_id.clone()))
        } else {
            Err(ConfirmError::ServiceUnavailable(format!(
                "state lookup returned {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl ConfirmTransport for HttpTransport {
    async fn confirm(&self, request: &ConfirmRequest) -> Result<ConfirmOutcome, ConfirmError> {
        let url = self.url(&[
            "agents",
            &request.entity_id.0,
            "operations",
            request.operation.as_str(),
            "confirm",
        ])?;

        // Transport failures are transient from the ledger's point of view.
        let response = self
            .client
            .post(url)
            .header(CALLER_HEADER, self.caller.to_string())
            .json(&ConfirmBody::from(request))
            .send()
            .await
            .map_err(|e| ConfirmError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<ConfirmOutcome>()
                .await
                .map_err(|e| ConfirmError::Internal(format!("Malformed confirm response: {}", e)));
        }

        // Gateway and request timeouts carry no error body and say nothing
        // about the transaction, so they are retried like a 5xx.
        let transient = status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT;
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(body.into_error(request)),
            Err(_) if transient => Err(ConfirmError::ServiceUnavailable(format!(
                "server returned {}",
                status
            ))),
            Err(e) => Err(ConfirmError::Internal(format!(
                "Unexpected {} response: {}",
                status, e
            ))),
        }
    }
}
