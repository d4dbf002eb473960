#![allow(dead_code)]

// Shared helpers for integration tests.
//
// These helpers use `tower_cookies::Cookie` parsing/encoding to match what the middleware
// emits in `Set-Cookie` and what browsers send back in `Cookie`.
use std::convert::Infallible;

use axum::body::Body;
use http::{HeaderMap, Request, Response, header};
use http_body_util::BodyExt as _;
use tower_cookies::Cookie;
use tower_csrf_cookie::{CsrfConfig, CsrfLayer, CsrfToken, Secret};

pub const SECRET: &[u8] = b"integration test secret";

pub fn make_layer(config: CsrfConfig) -> CsrfLayer {
    CsrfLayer::new(Secret::new(SECRET)).with_config(config)
}

pub async fn body_string(body: Body) -> String {
    // Collect an Axum body into a UTF-8 string for assertions.
    let bytes = body
        .collect()
        .await
        .expect("body collects successfully")
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

pub async fn token_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    // Echo the salted token attached by the layer.
    let token = req
        .extensions()
        .get::<CsrfToken>()
        .map(|token| token.as_str().to_owned())
        .unwrap_or_default();

    Ok(Response::new(Body::from(token)))
}

pub async fn echo_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    // Echo the body the inner service receives, to check token stripping.
    let content_length = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .map(|value| value.to_str().expect("content-length is ascii").to_owned());
    let body = body_string(req.into_body()).await;

    if let Some(content_length) = content_length {
        assert_eq!(content_length, body.len().to_string());
    }

    Ok(Response::new(Body::from(body)))
}

pub fn get_token_cookie(res: &Response<Body>) -> Cookie<'static> {
    get_token_cookie_from_headers(res.headers())
}

pub fn get_token_cookie_from_headers(headers: &HeaderMap) -> Cookie<'static> {
    // Parse the `Set-Cookie` header into a `Cookie` structure.
    let set_cookie = headers
        .get(header::SET_COOKIE)
        .expect("response includes set-cookie header");
    let set_cookie = set_cookie
        .to_str()
        .expect("set-cookie header is valid utf-8");
    Cookie::parse_encoded(set_cookie)
        .expect("set-cookie parses successfully")
        .into_owned()
}

pub fn cookie_header_value(cookie: &Cookie<'_>) -> String {
    // Encode a cookie for use in a `Cookie` request header.
    cookie.encoded().to_string()
}

pub fn raw_cookie_header(name: &str, value: &str) -> String {
    cookie_header_value(&Cookie::new(name.to_owned(), value.to_owned()))
}

pub fn form_body(fields: &[(&str, &str)]) -> Body {
    Body::from(serde_urlencoded::to_string(fields).expect("form encodes"))
}
