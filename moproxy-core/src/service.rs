//! Fallback forwarding of requests across the configured origins.
//!
//! Every inbound request is answered by asking each origin in priority order
//! for the same path. The first origin that answers `200 OK` has its body
//! streamed back to the client untouched; if none does, the client gets an
//! empty `404 Not Found`.

use std::{convert::Infallible, pin::Pin, sync::Arc, time::Duration};

use anyhow::Context as _;
use http::{HeaderValue, Method, Request, Response, StatusCode, header};
use http_body_util::{BodyExt as _, Empty, combinators::BoxBody};
use hyper::{
    body::{Bytes, Incoming},
    service::Service as HyperService,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tracing::{debug, info};

use crate::origin::OriginList;

/// Body type of every response the gateway writes.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

type UpstreamClient = Client<HttpsConnector<HttpConnector>, Empty<Bytes>>;

/// Result of asking a single origin for a resource.
#[derive(Debug)]
pub enum UpstreamOutcome {
    /// The origin answered `200 OK`; the response still holds the unread body.
    Served(Response<Incoming>),
    /// The origin answered with any other status.
    Rejected(StatusCode),
    /// The request never produced a response: bad target, transport error or
    /// timeout.
    Failed(anyhow::Error),
}

/// Request-forwarding context shared by all connections.
///
/// Built once at startup and never mutated, so it can be read concurrently
/// by every request handler without synchronization.
#[derive(Debug)]
pub struct Forwarder {
    origins: OriginList,
    client: UpstreamClient,
    timeout: Duration,
}

impl Forwarder {
    /// Creates a forwarder over `origins`.
    ///
    /// # Arguments
    ///
    /// * `origins` - Origins in the order they should be tried
    /// * `timeout` - Upper bound for connecting to an origin and receiving its
    ///   response headers
    pub fn new(origins: OriginList, timeout: Duration) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(timeout));

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        // No idle pool: every attempt gets a fresh connection that is closed
        // once its response is dropped.
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(https);

        debug!(
            "Creating forwarder with {} origins, timeout {:?}",
            origins.len(),
            timeout
        );

        Self {
            origins,
            client,
            timeout,
        }
    }

    pub fn origins(&self) -> &OriginList {
        &self.origins
    }

    /// Serves `request_path` from the first origin that has it.
    ///
    /// The root path, and anything that is not an absolute path (the empty
    /// path of a CONNECT request, the `*` of `OPTIONS *`), is never proxied.
    /// Origins are tried strictly in order
    /// and the loop stops at the first `200 OK`; every other outcome is
    /// logged and skipped.
    ///
    /// # Returns
    ///
    /// Returns the streamed upstream response with `Content-Length` and
    /// `Content-Location` set, or an empty `404 Not Found`.
    pub async fn forward(&self, request_path: &str) -> Response<ProxyBody> {
        if !is_proxyable(request_path) {
            debug!("Not proxying path {:?}", request_path);
            return not_found();
        }

        for origin in &self.origins {
            let target = origin.target_url(request_path);
            debug!("Requesting {}", target);

            match self.fetch(&target).await {
                UpstreamOutcome::Served(response) => return serve(&target, response),
                UpstreamOutcome::Rejected(status) => {
                    debug!("{} answered {}, trying next origin", target, status);
                }
                UpstreamOutcome::Failed(e) => {
                    debug!("{} failed: {:#}, trying next origin", target, e);
                }
            }
        }

        info!("Not found: {}", request_path);
        not_found()
    }

    /// Performs one GET against `target` and classifies the result.
    ///
    /// Non-serving responses are dropped here, which releases their
    /// connection before the next origin is contacted.
    pub async fn fetch(&self, target: &str) -> UpstreamOutcome {
        let request = match Request::builder()
            .method(Method::GET)
            .uri(target)
            .header(header::CONNECTION, "close")
            .body(Empty::<Bytes>::new())
            .with_context(|| format!("building request for {target}"))
        {
            Ok(request) => request,
            Err(e) => return UpstreamOutcome::Failed(e),
        };

        let response = match tokio::time::timeout(self.timeout, self.client.request(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return UpstreamOutcome::Failed(e.into()),
            Err(_) => {
                return UpstreamOutcome::Failed(anyhow::anyhow!(
                    "no response within {:?}",
                    self.timeout
                ));
            }
        };

        match response.status() {
            StatusCode::OK => UpstreamOutcome::Served(response),
            status => UpstreamOutcome::Rejected(status),
        }
    }
}

/// Only absolute paths below the root name a resource.
fn is_proxyable(request_path: &str) -> bool {
    request_path.len() > 1 && request_path.starts_with('/')
}

/// Turns a successful upstream response into the client response.
fn serve(target: &str, upstream: Response<Incoming>) -> Response<ProxyBody> {
    let content_length = upstream.headers().get(header::CONTENT_LENGTH).cloned();
    match content_length.as_ref().and_then(|v| v.to_str().ok()) {
        Some(length) => info!("Serving {} ({} bytes)", target, length),
        None => info!("Serving {} (unknown length)", target),
    }

    let mut response = Response::new(upstream.into_body().boxed());
    let headers = response.headers_mut();
    if let Some(length) = content_length {
        headers.insert(header::CONTENT_LENGTH, length);
    }
    match HeaderValue::try_from(target) {
        Ok(location) => {
            headers.insert(header::CONTENT_LOCATION, location);
        }
        Err(e) => debug!("Not setting Content-Location for {}: {}", target, e),
    }
    response
}

fn not_found() -> Response<ProxyBody> {
    let mut response = Response::new(
        Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed(),
    );
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

/// Hyper service answering every request through a shared [`Forwarder`].
///
/// Any method is treated as a GET of the request path; the inbound body and
/// query string are ignored.
#[derive(Debug, Clone)]
pub struct FallbackService {
    forwarder: Arc<Forwarder>,
}

impl FallbackService {
    pub fn new(forwarder: Arc<Forwarder>) -> Self {
        Self { forwarder }
    }
}

impl HyperService<Request<Incoming>> for FallbackService {
    type Response = Response<ProxyBody>;

    type Error = Infallible;

    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let forwarder = Arc::clone(&self.forwarder);
        let path = req.uri().path().to_owned();
        debug!("Processing request: {} {}", req.method(), req.uri());

        Box::pin(async move { Ok(forwarder.forward(&path).await) })
    }
}
