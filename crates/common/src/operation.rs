//! In-flight storage operations and the bounce protocol
//!
//! An operation is created by an access node from the caller's form
//! parameters, then carried from storage node to storage node inside an
//! encrypted `data` query parameter. No server keeps operation state: each
//! hop decrypts the payload under its own key, merges what it already stores,
//! and re-encrypts for the next hop.
//!
//! Routing: the first and last storage hops go to the client's home node,
//! intermediate hops to random other storage nodes. Once the hop budget is
//! spent the accumulated pairs are sealed as [`Results`] for the access node
//! and appended to the caller's return URL.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Buf;
use chrono::{DateTime, Utc};
use url::Url;

use crate::codec::{self, CodecError};
use crate::form::FormValues;
use crate::network::{Network, NetworkError};
use crate::node::{Node, NodeError, Role};
use crate::pair::{merge_pairs, Pair, PairError};
use crate::results::{Results, ResultsError};
use crate::store::{NodeStore, StoreError};

pub const BROWSER_WARNING_PARAM: &str = "browserWarning";
pub const TITLE_PARAM: &str = "title";
pub const MESSAGE_PARAM: &str = "message";
pub const RETURN_URL_PARAM: &str = "returnUrl";
pub const PROGRESS_COLOR_PARAM: &str = "progressColor";
pub const BACKGROUND_COLOR_PARAM: &str = "backgroundColor";
pub const MESSAGE_COLOR_PARAM: &str = "messageColor";
pub const TABLE_PARAM: &str = "table";
pub const X_FORWARDED_FOR_PARAM: &str = "X-FORWARDED-FOR";
pub const REMOTE_ADDR_PARAM: &str = "remoteAddr";
pub const BOUNCES_PARAM: &str = "bounces";
pub const STATE_PARAM: &str = "state";
pub const ACCESS_KEY_PARAM: &str = "accessKey";
/// Query parameter carrying encrypted payloads between nodes
pub const DATA_PARAM: &str = "data";

/// Leading byte of every serialized operation
const PAYLOAD_VERSION: u8 = 1;
/// Bounce counts must stay below this value to fit the payload byte
const MAX_BOUNCES: i64 = 255;

/// True for form fields that configure the operation rather than carry a
/// key/value pair
pub fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        TITLE_PARAM
            | MESSAGE_PARAM
            | RETURN_URL_PARAM
            | PROGRESS_COLOR_PARAM
            | MESSAGE_COLOR_PARAM
            | BACKGROUND_COLOR_PARAM
            | TABLE_PARAM
            | BROWSER_WARNING_PARAM
            | X_FORWARDED_FOR_PARAM
            | REMOTE_ADDR_PARAM
            | BOUNCES_PARAM
            | STATE_PARAM
            | ACCESS_KEY_PARAM
    )
}

/// Probability of showing a browser warning. Anything that does not parse
/// as a finite number means no warning; parsed values are clamped to [0, 1].
pub fn parse_browser_warning(value: &str) -> f32 {
    match value.trim().parse::<f32>() {
        Ok(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("Host '{0}' is not a Swift node")]
    UnknownHost(String),
    #[error("Domain '{0}' is not an access node")]
    NotAccessNode(String),
    #[error("Network '{0}' not found")]
    UnknownNetwork(String),
    #[error("Bounces '{0}' is not a valid number")]
    InvalidBounces(String),
    #[error("Bounces must be greater than 0")]
    BouncesTooLow,
    #[error("Bounces '{0}' must be less than 255")]
    BouncesTooHigh(i64),
    #[error("Invalid return URL '{url}': {source}")]
    InvalidReturnUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Missing scheme from URL '{0}'")]
    MissingScheme(String),
    #[error("Missing host from URL '{0}'")]
    MissingHost(String),
    #[error("Missing table name")]
    MissingTable,
    #[error("Operation is for network '{found}' but node belongs to '{expected}'")]
    NetworkMismatch { expected: String, found: String },
    #[error("Access node '{0}' is not part of the network")]
    UnknownAccessNode(String),
    #[error("Operation has no bounces remaining")]
    Exhausted,
    #[error("Operation has no next node")]
    NoNextNode,
    #[error("invalid data parameter: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Pair(#[from] PairError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("Malformed operation: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Results(#[from] ResultsError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OperationError {
    /// True when the caller supplied bad input, as opposed to a failure of
    /// the node or its directory
    pub fn is_input_error(&self) -> bool {
        !matches!(
            self,
            OperationError::Store(_)
                | OperationError::Results(_)
                | OperationError::Node(NodeError::NoSecrets(_))
                | OperationError::Node(NodeError::Secret(_))
        )
    }
}

/// User interface parameters for the pages shown while bouncing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Html {
    pub title: String,
    pub message: String,
    pub message_color: String,
    pub background_color: String,
    pub progress_color: String,
}

/// How hop URLs are formed on each node's domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub scheme: String,
    pub path: String,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            path: "/swift/bounce".to_string(),
        }
    }
}

/// Values used when the caller does not provide them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub node_count: u8,
    pub html: Html,
    pub route: Route,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            node_count: 10,
            html: Html::default(),
            route: Route::default(),
        }
    }
}

/// An inbound create request as seen by the access node
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// Host the request was addressed to
    pub host: String,
    pub form: FormValues,
    /// Value of the live X-Forwarded-For header, if any
    pub forwarded_for: Option<String>,
    /// Address of the connection the request arrived on
    pub remote_addr: String,
}

/// Where the next redirect goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hop {
    /// Another storage node
    Next(Url),
    /// The caller's return URL with the sealed results
    Return(Url),
}

impl Hop {
    pub fn url(&self) -> &Url {
        match self {
            Hop::Next(url) | Hop::Return(url) => url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    network: Arc<Network>,
    route: Route,
    access_node: String,
    home_node: String,
    next_node: Option<Arc<Node>>,
    node_count: u8,
    return_url: Url,
    state: String,
    table: String,
    values: Vec<Pair>,
    browser_warning: f32,
    html: Html,
}

/// Build the first redirect URL for a create request
pub async fn create_url<S: NodeStore>(
    store: &S,
    defaults: &Defaults,
    request: &CreateRequest,
) -> Result<Url, OperationError> {
    let operation = create_operation(store, defaults, request).await?;
    tracing::debug!(
        access = %operation.access_node,
        home = %operation.home_node,
        bounces = operation.node_count,
        pairs = operation.values.len(),
        "created operation"
    );
    operation.next_url()
}

/// Resolve the access node and its network, then validate the request
pub async fn create_operation<S: NodeStore>(
    store: &S,
    defaults: &Defaults,
    request: &CreateRequest,
) -> Result<Operation, OperationError> {
    let access = store
        .get_node(&request.host)
        .await?
        .ok_or_else(|| OperationError::UnknownHost(request.host.clone()))?;
    if access.role() != Role::Access {
        return Err(OperationError::NotAccessNode(access.domain().to_string()));
    }
    let network = store
        .get_nodes(access.network())
        .await?
        .ok_or_else(|| OperationError::UnknownNetwork(access.network().to_string()))?;

    Operation::create(&access, network, defaults, request)
}

fn parse_bounces(value: &str, default: u8) -> Result<u8, OperationError> {
    if value.is_empty() {
        return Ok(default);
    }
    let count: i64 = value
        .trim()
        .parse()
        .map_err(|_| OperationError::InvalidBounces(value.to_string()))?;
    if count <= 0 {
        return Err(OperationError::BouncesTooLow);
    }
    if count >= MAX_BOUNCES {
        return Err(OperationError::BouncesTooHigh(count));
    }
    u8::try_from(count).map_err(|_| OperationError::BouncesTooHigh(count))
}

fn parse_return_url(value: &str) -> Result<Url, OperationError> {
    let url = Url::parse(value).map_err(|source| match source {
        url::ParseError::RelativeUrlWithoutBase => OperationError::MissingScheme(value.to_string()),
        url::ParseError::EmptyHost => OperationError::MissingHost(value.to_string()),
        source => OperationError::InvalidReturnUrl {
            url: value.to_string(),
            source,
        },
    })?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(OperationError::MissingHost(value.to_string())),
    }
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

impl Operation {
    /// Build a new operation for `access` from the request's parameters.
    /// Construction is all-or-nothing: the first invalid parameter or pair
    /// aborts it.
    pub fn create(
        access: &Node,
        network: Arc<Network>,
        defaults: &Defaults,
        request: &CreateRequest,
    ) -> Result<Self, OperationError> {
        let form = &request.form;

        let node_count = parse_bounces(form.get(BOUNCES_PARAM), defaults.node_count)?;
        let return_url = parse_return_url(form.get(RETURN_URL_PARAM))?;
        let state = form.get(STATE_PARAM).to_string();
        let table = form.get(TABLE_PARAM).to_string();
        if table.is_empty() {
            return Err(OperationError::MissingTable);
        }
        let browser_warning = parse_browser_warning(form.get(BROWSER_WARNING_PARAM));

        let html = Html {
            title: or_default(form.get(TITLE_PARAM), &defaults.html.title),
            message: or_default(form.get(MESSAGE_PARAM), &defaults.html.message),
            message_color: or_default(form.get(MESSAGE_COLOR_PARAM), &defaults.html.message_color),
            background_color: or_default(
                form.get(BACKGROUND_COLOR_PARAM),
                &defaults.html.background_color,
            ),
            progress_color: or_default(
                form.get(PROGRESS_COLOR_PARAM),
                &defaults.html.progress_color,
            ),
        };

        let mut values = Vec::new();
        for (name, entries) in form.iter().filter(|(name, _)| !is_reserved(name)) {
            if let Some(first) = entries.first() {
                values.push(Pair::create(name, first)?);
            }
        }

        // The form override wins over the live header and connection
        let xff = match form.get(X_FORWARDED_FOR_PARAM) {
            "" => request.forwarded_for.as_deref().unwrap_or_default(),
            value => value,
        };
        let remote_addr = match form.get(REMOTE_ADDR_PARAM) {
            "" => request.remote_addr.as_str(),
            value => value,
        };
        let home = network.home_node(xff, remote_addr)?;

        Ok(Self {
            route: defaults.route.clone(),
            access_node: access.domain().to_string(),
            home_node: home.domain().to_string(),
            next_node: Some(home),
            network,
            node_count,
            return_url,
            state,
            table,
            values,
            browser_warning,
            html,
        })
    }

    /* Getters */

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn access_node(&self) -> &str {
        &self.access_node
    }

    pub fn home_node(&self) -> &str {
        &self.home_node
    }

    pub fn next_node(&self) -> Option<&Arc<Node>> {
        self.next_node.as_ref()
    }

    pub fn node_count(&self) -> u8 {
        self.node_count
    }

    pub fn return_url(&self) -> &Url {
        &self.return_url
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn values(&self) -> &[Pair] {
        &self.values
    }

    pub fn browser_warning(&self) -> f32 {
        self.browser_warning
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /* Payload */

    fn encode(&self) -> Result<Vec<u8>, OperationError> {
        let mut buf = Vec::new();
        codec::write_byte(&mut buf, PAYLOAD_VERSION);
        codec::write_string(&mut buf, self.network.id())?;
        codec::write_string(&mut buf, &self.access_node)?;
        codec::write_string(&mut buf, &self.home_node)?;
        codec::write_byte(&mut buf, self.node_count);
        codec::write_string(&mut buf, self.return_url.as_str())?;
        codec::write_string(&mut buf, &self.state)?;
        codec::write_string(&mut buf, &self.table)?;
        codec::write_f32(&mut buf, self.browser_warning);
        codec::write_string(&mut buf, &self.html.title)?;
        codec::write_string(&mut buf, &self.html.message)?;
        codec::write_string(&mut buf, &self.html.message_color)?;
        codec::write_string(&mut buf, &self.html.background_color)?;
        codec::write_string(&mut buf, &self.html.progress_color)?;
        let count = u16::try_from(self.values.len())
            .map_err(|_| CodecError::TooLong(self.values.len()))?;
        codec::write_u16(&mut buf, count);
        for pair in &self.values {
            pair.write_to(&mut buf)?;
        }
        Ok(buf)
    }

    fn decode(
        data: &[u8],
        network: Arc<Network>,
        route: Route,
    ) -> Result<Self, OperationError> {
        let mut reader = data;
        let version = codec::read_byte(&mut reader)?;
        if version != PAYLOAD_VERSION {
            return Err(CodecError::UnsupportedVersion(version).into());
        }
        let network_id = codec::read_string(&mut reader)?;
        if network_id != network.id() {
            return Err(OperationError::NetworkMismatch {
                expected: network.id().to_string(),
                found: network_id,
            });
        }
        let access_node = codec::read_string(&mut reader)?;
        let home_node = codec::read_string(&mut reader)?;
        let node_count = codec::read_byte(&mut reader)?;
        let return_url = Url::parse(&codec::read_string(&mut reader)?)?;
        let state = codec::read_string(&mut reader)?;
        let table = codec::read_string(&mut reader)?;
        let browser_warning = codec::read_f32(&mut reader)?;
        let html = Html {
            title: codec::read_string(&mut reader)?,
            message: codec::read_string(&mut reader)?,
            message_color: codec::read_string(&mut reader)?,
            background_color: codec::read_string(&mut reader)?,
            progress_color: codec::read_string(&mut reader)?,
        };
        let count = codec::read_u16(&mut reader)?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(Pair::read_from(&mut reader)?);
        }
        if reader.has_remaining() {
            return Err(CodecError::TooLong(reader.remaining()).into());
        }

        Ok(Self {
            network,
            route,
            access_node,
            home_node,
            next_node: None,
            node_count,
            return_url,
            state,
            table,
            values,
            browser_warning,
            html,
        })
    }

    /// Open the `data` parameter received by `node`
    pub fn from_payload(
        node: &Node,
        network: Arc<Network>,
        route: Route,
        data: &str,
    ) -> Result<Self, OperationError> {
        if node.network() != network.id() {
            return Err(OperationError::NetworkMismatch {
                expected: network.id().to_string(),
                found: node.network().to_string(),
            });
        }
        let sealed = URL_SAFE_NO_PAD.decode(data)?;
        let plain = node.decrypt(&sealed)?;
        Self::decode(&plain, network, route)
    }

    /// URL for the next hop with the operation sealed under that node's
    /// newest secret
    pub fn next_url(&self) -> Result<Url, OperationError> {
        let next = self.next_node.as_ref().ok_or(OperationError::NoNextNode)?;
        let sealed = next.encrypt(&self.encode()?)?;
        let mut url = Url::parse(&format!(
            "{}://{}{}",
            self.route.scheme,
            next.domain(),
            self.route.path
        ))?;
        url.query_pairs_mut()
            .append_pair(DATA_PARAM, &URL_SAFE_NO_PAD.encode(sealed));
        Ok(url)
    }

    /// Perform this storage node's hop: merge the pairs it holds, spend one
    /// bounce and work out where the client goes next.
    pub fn bounce(
        &mut self,
        current: &Node,
        stored: &[Pair],
        now: DateTime<Utc>,
    ) -> Result<Hop, OperationError> {
        if self.node_count == 0 {
            return Err(OperationError::Exhausted);
        }
        self.values = merge_pairs(&self.values, stored, now);
        self.node_count -= 1;

        if self.node_count == 0 {
            tracing::debug!(node = %current.domain(), "operation complete");
            return Ok(Hop::Return(self.final_url(now)?));
        }

        // The last storage hop returns to the home node so the client's
        // stored values end up where repeat visits will look for them
        let next = match self.network.get(&self.home_node) {
            Some(home) if self.node_count == 1 && home.is_active_at(now) => home,
            _ => self.network.next_node(current.domain())?,
        };
        tracing::debug!(
            node = %current.domain(),
            next = %next.domain(),
            remaining = self.node_count,
            "bouncing operation"
        );
        self.next_node = Some(next);
        Ok(Hop::Next(self.next_url()?))
    }

    /// The caller's return URL with the results sealed for the access node
    fn final_url(&self, now: DateTime<Utc>) -> Result<Url, OperationError> {
        let access = self
            .network
            .get(&self.access_node)
            .ok_or_else(|| OperationError::UnknownAccessNode(self.access_node.clone()))?;
        let results = Results::new(now, self.values.clone());
        let sealed = access.encrypt(&results.encode()?)?;

        let mut url = self.return_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(DATA_PARAM, &URL_SAFE_NO_PAD.encode(sealed));
            if !self.state.is_empty() {
                query.append_pair(STATE_PARAM, &self.state);
            }
        }
        Ok(url)
    }
}
