//! # Endpoint
//!
//! `Endpoint` provides the entry point for protocol messages. Each adapter
//! message type implements [`Handler`]; [`handle`] routes a request to its
//! handler and returns the handler's typed response. The machinery is
//! shared by every adapter and is generic over the adapter's error type, so
//! OpenID endpoints surface OAuth-style errors while VC-API endpoints
//! surface the exchange error taxonomy.
//!
//! Handlers are designed to sit behind a thin HTTP wrapper: the wrapper
//! parses the body, copies relevant headers and connection facts into the
//! [`Request`], and maps the returned [`Response`] status and body onto the
//! HTTP response.

use std::fmt::Debug;
use std::net::IpAddr;

use http::HeaderMap;

use crate::error::{Error, Result};
use crate::provider::{Authorization, Provider};

/// Handle an incoming protocol message addressed to `target` (a workflow or
/// exchange URL).
///
/// # Errors
///
/// Returns the handler's protocol error when the message cannot be
/// processed: invalid authorization, an expired or completed exchange,
/// invalid message content.
pub async fn handle<B, U, E>(
    target: &str, request: impl Into<Request<B>>, provider: &impl Provider,
) -> Result<Response<U>, E>
where
    B: Body,
    Request<B>: Handler<Response = U, Error = E>,
{
    let request: Request<B> = request.into();
    request.handle(target, provider).await
}

/// A request to process.
#[derive(Clone, Debug)]
pub struct Request<B>
where
    B: Body,
{
    /// The request body.
    pub body: B,

    /// Request headers, for handlers whose behavior a header gates.
    pub headers: Option<HeaderMap>,

    /// The credential presented with the request.
    pub authorization: Authorization,

    /// The caller's network address, checked against workflow allow-lists.
    pub source: Option<IpAddr>,
}

impl<B: Body> Request<B> {
    /// A request with the given body and no ambient context.
    pub fn new(body: B) -> Self {
        Self {
            body,
            headers: None,
            authorization: Authorization::None,
            source: None,
        }
    }

    /// Attach request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Attach the presented credential.
    #[must_use]
    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = authorization;
        self
    }

    /// Attach the caller's network address.
    #[must_use]
    pub const fn with_source(mut self, source: IpAddr) -> Self {
        self.source = Some(source);
        self
    }

    /// Whether the request accepts a JSON response. An absent `Accept`
    /// header accepts anything.
    #[must_use]
    pub fn accepts_json(&self) -> bool {
        let Some(headers) = &self.headers else {
            return true;
        };
        let Some(accept) = headers.get(http::header::ACCEPT) else {
            return true;
        };
        accept.to_str().is_ok_and(|accept| {
            accept
                .split(',')
                .map(|part| part.split(';').next().unwrap_or_default().trim())
                .any(|mt| mt == "application/json" || mt == "*/*" || mt == "application/*")
        })
    }
}

impl<B: Body> From<B> for Request<B> {
    fn from(body: B) -> Self {
        Self::new(body)
    }
}

/// A typed response plus the transport facts needed to surface it.
#[derive(Clone, Debug)]
pub struct Response<T> {
    /// HTTP status code to convey.
    pub status: u16,

    /// Headers to convey, e.g. `Location` for created resources.
    pub headers: Option<HeaderMap>,

    /// The response body.
    pub body: T,
}

impl<T> From<T> for Response<T> {
    fn from(body: T) -> Self {
        Self { status: 200, headers: None, body }
    }
}

/// Methods common to all messages.
pub trait Handler: Clone + Debug + Send + Sync {
    /// The reply type specific to the implementing message.
    type Response;

    /// The error type the owning adapter surfaces.
    type Error;

    /// Routes the message to the concrete handler used to process it.
    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>, Self::Error>> + Send;
}

/// A parsed exchange URL:
/// `{base}/workflows/{workflowLocalId}/exchanges/{exchangeId}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeRef {
    /// The full exchange URL.
    pub url: String,

    /// The owning workflow's URL (everything before `/exchanges/`).
    pub workflow_url: String,

    /// The exchange id (the segment after `/exchanges/`).
    pub exchange_id: String,
}

impl ExchangeRef {
    /// Parse an exchange URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the URL is not a well-formed
    /// exchange URL, so malformed targets are indistinguishable from
    /// missing exchanges.
    pub fn parse(target: &str) -> Result<Self> {
        let not_found = || Error::NotFound("exchange not found".to_string());

        let parsed = url::Url::parse(target).map_err(|_| not_found())?;
        if parsed.cannot_be_a_base() {
            return Err(not_found());
        }
        let Some((workflow_url, rest)) = target.split_once("/exchanges/") else {
            return Err(not_found());
        };
        let exchange_id = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if exchange_id.is_empty() || workflow_url.is_empty() {
            return Err(not_found());
        }
        Ok(Self {
            url: format!("{workflow_url}/exchanges/{exchange_id}"),
            workflow_url: workflow_url.to_string(),
            exchange_id: exchange_id.to_string(),
        })
    }
}

pub(crate) use seal::Body;
pub(crate) mod seal {
    use std::fmt::Debug;

    /// The `Body` trait restricts the types able to be a `Request` body.
    /// It is implemented by all `XxxRequest` types.
    pub trait Body: Clone + Debug + Send + Sync {}
}
