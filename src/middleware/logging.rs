//! HTTP access log plus timing helpers for store and gateway calls.
//!
//! Every request gets one completion event tagged with the request id set by
//! [`UuidRequestId`]. The `log_*` wrappers time a future and report how it
//! went without changing its result.

use std::future::Future;
use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const SLOW_REQUEST: Duration = Duration::from_millis(200);
const SLOW_QUERY: Duration = Duration::from_millis(100);

/// Issues a fresh v4 UUID for each incoming request.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        Uuid::new_v4()
            .to_string()
            .parse()
            .ok()
            .map(RequestId::new)
    }
}

/// How a finished request should be reported.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    ServerError,
    Slow,
    Rejected,
    Ok,
}

impl Outcome {
    fn classify(status: u16, elapsed: Duration) -> Self {
        match status {
            s if s >= 500 => Outcome::ServerError,
            _ if elapsed > SLOW_REQUEST => Outcome::Slow,
            400..=499 => Outcome::Rejected,
            _ => Outcome::Ok,
        }
    }
}

/// Axum middleware writing one access-log line per request.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_owned(),
        None => request.uri().path().to_owned(),
    };
    let request_id = header_str(request.headers(), REQUEST_ID_HEADER)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("http", %request_id, %method, %route);
    let response = next.run(request).instrument(span).await;

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    let elapsed_ms = elapsed.as_millis() as u64;

    match Outcome::classify(status, elapsed) {
        Outcome::ServerError => {
            error!(%request_id, %method, %route, status, elapsed_ms, "handler returned a server error")
        }
        Outcome::Slow => warn!(%request_id, %method, %route, status, elapsed_ms, "request exceeded latency budget"),
        Outcome::Rejected => warn!(%request_id, %method, %route, status, elapsed_ms, "request rejected"),
        Outcome::Ok => info!(%request_id, %method, %route, status, elapsed_ms, "request served"),
    }

    response
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Caller address, preferring the first hop in `X-Forwarded-For` over `X-Real-IP`.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());

    forwarded
        .or_else(|| header_str(headers, "x-real-ip").map(str::trim))
        .map(str::to_owned)
}

async fn timed<Fut: Future>(work: Fut) -> (Fut::Output, Duration) {
    let started = Instant::now();
    let output = work.await;
    (output, started.elapsed())
}

/// Run a store query, warning when it is slow and logging an error when it fails.
pub async fn log_database_query<Fut, T, E>(query: &str, work: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    let (result, elapsed) = timed(work).await;
    let elapsed_ms = elapsed.as_millis() as u64;

    match (&result, elapsed > SLOW_QUERY) {
        (Err(_), _) => error!(event = "store_query_failed", query, elapsed_ms, "store query failed"),
        (Ok(_), true) => warn!(event = "store_query_slow", query, elapsed_ms, "store query was slow"),
        (Ok(_), false) => debug!(event = "store_query", query, elapsed_ms, "store query ok"),
    }

    result
}

/// Run an outbound gateway call and record its latency and outcome.
pub async fn log_external_call<Fut, T, E>(service: &str, endpoint: &str, work: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    debug!(event = "gateway_call_sent", service, endpoint, "calling gateway");
    let (result, elapsed) = timed(work).await;
    let elapsed_ms = elapsed.as_millis() as u64;

    if result.is_ok() {
        info!(event = "gateway_call_ok", service, endpoint, elapsed_ms, "gateway answered");
    } else {
        error!(event = "gateway_call_failed", service, endpoint, elapsed_ms, "gateway call failed");
    }

    result
}
