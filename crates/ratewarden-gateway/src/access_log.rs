//! Access-log middleware (spec.md §4.8, §6): parses request attributes once
//! (query string, and form body for POSTs) so handlers never re-parse, and
//! logs `[ cip=<ip> intf=<path> k1=v1 ... ] [ BodyString=<json> ]` for every
//! request except `multi/browse`, which logs its own multi-line record.

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use ratewarden_core::Attributes;
use std::net::SocketAddr;

const MULTI_BROWSE_PATH: &str = "/multi/browse";
const MAX_BODY_BYTES: usize = 1024 * 1024;

fn attrs_from_query(uri: &axum::http::Uri) -> Attributes {
    uri.query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

fn is_form_urlencoded(req: &Request<Body>) -> bool {
    req.headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

/// Buffer the request body (if form-encoded), merge query + form attributes,
/// stash them as a request extension, and reconstruct the request so the
/// handler sees an intact body.
pub async fn extract_attrs(
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let mut attrs = attrs_from_query(req.uri());

    if is_form_urlencoded(&req) {
        let (parts, body) = req.into_parts();
        let bytes = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        attrs.extend(
            url::form_urlencoded::parse(&bytes)
                .into_owned()
                .collect::<Attributes>(),
        );
        req = Request::from_parts(parts, Body::from(bytes));
    }

    req.extensions_mut().insert(attrs);
    Ok(next.run(req).await)
}

/// Log one access-log line per non-`multi/browse` request (spec.md §6).
pub async fn log_access(req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let skip = path == MULTI_BROWSE_PATH;
    let cip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let attrs = req.extensions().get::<Attributes>().cloned();

    let response = next.run(req).await;

    if skip {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => {
            return Response::from_parts(parts, Body::empty());
        }
    };
    let body_str = String::from_utf8_lossy(&bytes);

    let intf = path.trim_start_matches('/');
    let mut kv = String::new();
    if let Some(attrs) = attrs {
        let mut keys: Vec<&String> = attrs.keys().collect();
        keys.sort();
        for k in keys {
            kv.push_str(&format!("{k}={} ", attrs[k]));
        }
    }
    tracing::info!(target: "access_log", "[ cip={cip} intf={intf} {kv}] [ BodyString={body_str} ]");

    Response::from_parts(parts, Body::from(bytes))
}
