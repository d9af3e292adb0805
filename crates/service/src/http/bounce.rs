use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};

use common::operation::DATA_PARAM;
use common::prelude::{
    FormValues, Hop, Node, NodeError, NodeStore, Operation, OperationError, Pair, Role, StoreError,
};

use super::{error_response, request_host};
use crate::ServiceState;

/// A storage hop: open the operation addressed to this node, merge the
/// values held in this node's cookies, store the merged values back and
/// redirect to the next node or to the caller.
pub async fn handler(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<(CookieJar, Redirect), BounceError> {
    let params: FormValues = params.into_iter().collect();
    let host = request_host(&headers);
    let node = state
        .store()
        .get_node(&host)
        .await?
        .ok_or_else(|| BounceError::UnknownHost(host.clone()))?;
    if node.role() != Role::Storage {
        return Err(BounceError::NotStorageNode(host));
    }
    let network = state
        .store()
        .get_nodes(node.network())
        .await?
        .ok_or_else(|| BounceError::UnknownNetwork(node.network().to_string()))?;

    let mut operation = Operation::from_payload(
        &node,
        network,
        state.defaults().route.clone(),
        params.get(DATA_PARAM),
    )?;

    let stored = stored_pairs(&node, &jar, operation.table());
    let now = Utc::now();
    let hop = operation.bounce(&node, &stored, now)?;

    let secure = state.config().scheme == "https";
    let mut jar = jar;
    for pair in operation.values().iter().filter(|p| !p.is_expired_at(now)) {
        jar = jar.add(storage_cookie(&node, operation.table(), pair, now, secure)?);
    }

    if let Hop::Return(_) = hop {
        tracing::info!(node = %node.domain(), "operation returned to caller");
    }
    Ok((jar, Redirect::to(hop.url().as_str())))
}

/// Pairs this node holds for `table`. Cookies that belong to other tables or
/// no longer open under the node's secrets are skipped.
fn stored_pairs(node: &Node, jar: &CookieJar, table: &str) -> Vec<Pair> {
    jar.iter()
        .filter(|cookie| {
            node.cookie_table(cookie.name())
                .map(|t| t == table)
                .unwrap_or(false)
        })
        .filter_map(
            |cookie| match node.value_from_cookie(cookie.name(), cookie.value()) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    tracing::debug!(node = %node.domain(), "ignoring stored cookie: {}", e);
                    None
                }
            },
        )
        .collect()
}

fn storage_cookie(
    node: &Node,
    table: &str,
    pair: &Pair,
    now: DateTime<Utc>,
    secure: bool,
) -> Result<Cookie<'static>, NodeError> {
    let name = node.cookie_name(table, pair)?;
    let value = node.value_to_cookie(pair, now)?;
    let max_age = time::Duration::seconds((pair.expires - now).num_seconds());
    Ok(Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build())
}

#[derive(Debug, thiserror::Error)]
pub enum BounceError {
    #[error("Host '{0}' is not a Swift node")]
    UnknownHost(String),
    #[error("Domain '{0}' is not a storage node")]
    NotStorageNode(String),
    #[error("Network '{0}' not found")]
    UnknownNetwork(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("Failed to store values: {0}")]
    Cookie(#[from] NodeError),
}

impl IntoResponse for BounceError {
    fn into_response(self) -> Response {
        let status = match &self {
            BounceError::UnknownHost(_) | BounceError::NotStorageNode(_) => StatusCode::BAD_REQUEST,
            BounceError::Operation(e) if e.is_input_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::BAD_REQUEST {
            tracing::warn!("BOUNCE: {}", self);
        } else {
            tracing::error!("BOUNCE ERROR: {:?}", self);
        }
        error_response(status, self)
    }
}
