/// HTTP endpoint for querying the reconciliation pipeline
///
/// Thin transport over `Daemon::handle`: parse the route, derive the caller
/// identity, map the outcome to a status code and JSON body.
///
/// Endpoints:
/// - GET /health - Service health check (not rate limited)
/// - GET /station/{id} - Reconciled level for one station
/// - GET /location?lat=..&lon=..&name=.. - Weather plus nearest station
/// - GET /aggregate - Reconciled levels for every station
/// - GET /rainfall - Statewide 24 h rainfall (cached)
/// - GET /warnings - Stations at watch or above

use serde_json::json;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::daemon::{Daemon, Query};
use crate::model::ServiceError;

const AVAILABLE_ENDPOINTS: [&str; 6] = [
    "/health",
    "/station/{id}",
    "/location?lat=&lon=&name=",
    "/aggregate",
    "/rainfall",
    "/warnings",
];

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Health,
    Query(Query),
    NotFound(String),
}

/// Maps a request URL (path plus optional query string) to a route.
/// Malformed parameters on a known route are a validation error.
pub fn parse_route(url: &str) -> Result<Route, ServiceError> {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    };
    let path = if path.len() > 1 { path.trim_end_matches('/') } else { path };

    let route = match path {
        "/health" => Route::Health,
        "/aggregate" => Route::Query(Query::Aggregate),
        "/rainfall" => Route::Query(Query::StatewideRainfall),
        "/warnings" => Route::Query(Query::Warnings),
        "/location" => Route::Query(parse_location(query)?),
        _ => match path.strip_prefix("/station/") {
            Some(raw) if !raw.contains('/') => Route::Query(Query::Station(decode(raw)?)),
            _ => Route::NotFound(path.to_string()),
        },
    };
    Ok(route)
}

fn parse_location(query: &str) -> Result<Query, ServiceError> {
    let mut lat = None;
    let mut lon = None;
    let mut name = None;

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "lat" => lat = Some(decode_query_value(value)?),
            "lon" | "lng" => lon = Some(decode_query_value(value)?),
            "name" => name = Some(decode_query_value(value)?),
            _ => {}
        }
    }

    let (Some(lat), Some(lon)) = (lat, lon) else {
        return Err(ServiceError::Validation("lat and lon are required".to_string()));
    };

    Ok(Query::Location {
        latitude: parse_number("lat", &lat)?,
        longitude: parse_number("lon", &lon)?,
        name,
    })
}

fn parse_number(field: &str, raw: &str) -> Result<f64, ServiceError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ServiceError::Validation(format!("{} is not numeric: '{}'", field, raw)))
}

fn decode(raw: &str) -> Result<String, ServiceError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| ServiceError::Validation(format!("malformed percent-encoding: '{}'", raw)))
}

/// Form-encoded query values also use '+' for a space; paths do not.
fn decode_query_value(raw: &str) -> Result<String, ServiceError> {
    decode(&raw.replace('+', " "))
}

/// Caller identity for rate limiting: first `X-Forwarded-For` hop, else the
/// peer address.
pub fn client_identity(forwarded_for: Option<&str>, remote: Option<SocketAddr>) -> String {
    forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Transport-independent response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: serde_json::Value,
    /// Seconds, for the `Retry-After` header on 429.
    pub retry_after: Option<u64>,
}

impl Reply {
    fn ok(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            body,
            retry_after: None,
        }
    }
}

pub fn error_reply(err: &ServiceError) -> Reply {
    let retry_after = match err {
        // never advertise 0, the caller would retry immediately
        ServiceError::RateLimited { retry_after } => {
            Some((retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)).max(1))
        }
        _ => None,
    };
    Reply {
        status: err.http_status(),
        body: json!({ "error": err.to_string() }),
        retry_after,
    }
}

/// Routes one request through the daemon.
pub fn respond(daemon: &Daemon, identity: &str, url: &str) -> Reply {
    let route = match parse_route(url) {
        Ok(route) => route,
        Err(e) => return error_reply(&e),
    };

    match route {
        Route::Health => Reply::ok(json!(daemon.health())),
        Route::NotFound(path) => Reply {
            status: 404,
            body: json!({
                "error": format!("no route for {}", path),
                "available_endpoints": AVAILABLE_ENDPOINTS,
            }),
            retry_after: None,
        },
        Route::Query(query) => match daemon.handle(identity, query) {
            Ok(response) => match serde_json::to_value(&response) {
                Ok(body) => Reply::ok(body),
                Err(e) => error_reply(&ServiceError::Internal(format!("failed to encode response: {}", e))),
            },
            Err(e) => error_reply(&e),
        },
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on the specified port. Blocks serving
/// requests until the listener closes.
pub fn start_endpoint_server(port: u16, workers: usize, daemon: Arc<Daemon>) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    info!(port, workers, "HTTP endpoint listening");
    serve(&server, workers, daemon);
    Ok(())
}

/// Accepts requests from `server` and answers each one on a pool of
/// `workers` threads. Returns when the server is unblocked or closes.
pub fn serve(server: &tiny_http::Server, workers: usize, daemon: Arc<Daemon>) {
    let pool = threadpool::Builder::new()
        .num_threads(workers.max(1))
        .thread_name("http-worker".to_string())
        .build();

    for request in server.incoming_requests() {
        let daemon = Arc::clone(&daemon);
        pool.execute(move || answer(&daemon, request));
    }
}

fn answer(daemon: &Daemon, request: tiny_http::Request) {
    let forwarded_for = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("X-Forwarded-For"))
        .map(|h| h.value.as_str().to_string());
    let identity = client_identity(forwarded_for.as_deref(), request.remote_addr().copied());

    let reply = if *request.method() == tiny_http::Method::Get {
        respond(daemon, &identity, request.url())
    } else {
        Reply {
            status: 405,
            body: json!({ "error": "only GET is supported" }),
            retry_after: None,
        }
    };
    debug!(url = request.url(), status = reply.status, identity = %identity, "request served");

    if let Err(e) = request.respond(create_response(&reply)) {
        warn!(error = %e, "failed to send response");
    }
}

/// Create HTTP response with JSON body
fn create_response(reply: &Reply) -> tiny_http::Response<Cursor<Vec<u8>>> {
    let body = serde_json::to_string_pretty(&reply.body).unwrap_or_else(|_| "{}".to_string());

    let mut response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(reply.status));
    if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    if let Some(secs) = reply.retry_after {
        if let Ok(header) = tiny_http::Header::from_bytes(&b"Retry-After"[..], secs.to_string().as_bytes()) {
            response = response.with_header(header);
        }
    }
    response
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
