//! Caller identity middleware.
//!
//! Signature verification happens upstream; by the time a request reaches
//! this service the verified wallet sits in the `x-wallet-address` header.

use alloy::primitives::Address;
use axum::{body::Body, http::Request, middleware::Next, response::Response};

use crate::http::wire::CALLER_HEADER;

/// Wallet the request was authenticated as, if any.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Caller(pub Option<Address>);

pub async fn caller_middleware(mut req: Request<Body>, next: Next) -> Response {
    let caller = req
        .headers()
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| match value.trim().parse::<Address>() {
            Ok(address) => Some(address),
            Err(_) => {
                tracing::warn!(value, "Malformed caller address header");
                None
            }
        });

    req.extensions_mut().insert(Caller(caller));
    next.run(req).await
}
