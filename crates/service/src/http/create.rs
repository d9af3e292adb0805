use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Form, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use common::operation::{ACCESS_KEY_PARAM, X_FORWARDED_FOR_PARAM};
use common::prelude::{create_url, CreateRequest, FormValues, OperationError};

use super::{error_response, request_host};
use crate::ServiceState;

/// Validate the caller's parameters and hand back the URL of the first
/// storage hop as plain text
pub async fn handler(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<impl IntoResponse, CreateError> {
    let form: FormValues = fields.into_iter().collect();
    if !state.access_allowed(form.get(ACCESS_KEY_PARAM)) {
        return Err(CreateError::Unauthorized);
    }

    let request = CreateRequest {
        host: request_host(&headers),
        forwarded_for: headers
            .get(X_FORWARDED_FOR_PARAM)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        remote_addr: connect_info
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default(),
        form,
    };

    let url = create_url(state.store(), state.defaults(), &request).await?;
    tracing::info!(host = %request.host, next = ?url.host_str(), "operation created");

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        url.to_string(),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("Access key missing or not recognised")]
    Unauthorized,
    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl IntoResponse for CreateError {
    fn into_response(self) -> Response {
        match self {
            CreateError::Unauthorized => {
                tracing::warn!("CREATE: rejected request without a valid access key");
                error_response(StatusCode::UNAUTHORIZED, CreateError::Unauthorized)
            }
            CreateError::Operation(e) if e.is_input_error() => {
                tracing::debug!("CREATE: bad request: {}", e);
                error_response(StatusCode::BAD_REQUEST, e)
            }
            CreateError::Operation(e) => {
                tracing::error!("CREATE ERROR: {:?}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
            }
        }
    }
}
