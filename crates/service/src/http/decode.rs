use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use common::operation::{ACCESS_KEY_PARAM, DATA_PARAM};
use common::prelude::{
    FormValues, NodeError, NodeStore, Pair, Results, ResultsError, Role, StoreError,
};

use super::{error_response, request_host};
use crate::ServiceState;

/// One returned value as seen by the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueResponse {
    pub key: String,
    pub value: String,
}

impl From<Pair> for ValueResponse {
    fn from(pair: Pair) -> Self {
        Self {
            key: pair.key,
            value: pair.value,
        }
    }
}

/// Open sealed results for the access node the request is addressed to and
/// return the values as a JSON array
pub async fn handler(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<impl IntoResponse, DecodeError> {
    let form: FormValues = fields.into_iter().collect();
    if !state.access_allowed(form.get(ACCESS_KEY_PARAM)) {
        return Err(DecodeError::Unauthorized);
    }

    let host = request_host(&headers);
    let node = state
        .store()
        .get_node(&host)
        .await?
        .ok_or_else(|| DecodeError::UnknownHost(host.clone()))?;
    if node.role() != Role::Access {
        return Err(DecodeError::NotAccessNode(host));
    }

    let sealed = URL_SAFE_NO_PAD.decode(form.get(DATA_PARAM))?;
    let plain = node.decrypt(&sealed)?;
    let results = Results::decode(&plain)?;
    if !results.is_timestamp_valid(state.config().max_results_age()) {
        return Err(DecodeError::Expired);
    }

    tracing::debug!(node = %node.domain(), values = results.values.len(), "results decoded");
    let values: Vec<ValueResponse> = results.values.into_iter().map(Into::into).collect();

    Ok((
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Json(values),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Not authorized")]
    Unauthorized,
    #[error("Host '{0}' is not a Swift node")]
    UnknownHost(String),
    #[error("Domain '{0}' is not an access node")]
    NotAccessNode(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Could not decrypt input: {0}")]
    Decrypt(#[from] NodeError),
    #[error(transparent)]
    Results(#[from] ResultsError),
    #[error("Results expired and can no longer be decrypted")]
    Expired,
}

impl IntoResponse for DecodeError {
    fn into_response(self) -> Response {
        let status = match &self {
            DecodeError::Unauthorized => StatusCode::UNAUTHORIZED,
            DecodeError::UnknownHost(_) | DecodeError::Store(_) => {
                tracing::error!("DECODE ERROR: {:?}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DecodeError::NotAccessNode(_)
            | DecodeError::Base64(_)
            | DecodeError::Decrypt(_)
            | DecodeError::Results(_)
            | DecodeError::Expired => StatusCode::BAD_REQUEST,
        };
        if status != StatusCode::INTERNAL_SERVER_ERROR {
            tracing::warn!("DECODE: {}", self);
        }
        error_response(status, self)
    }
}
