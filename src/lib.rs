//! Salted double-submit-cookie CSRF protection for `tower` services.
//!
//! [`CsrfLayer`] issues a checksummed token in a cookie on the first safe request and
//! exposes a salted copy of it to handlers through the [`CsrfToken`] request extension.
//! Data-bearing requests (`POST`, `PUT`, `PATCH`, `DELETE`, or any request with a parsed
//! body) must echo the salted token back, either in the configured body field or in the
//! `X-CSRF-Token` header, or they are rejected with `403 Forbidden`.
//!
//! # Security
//! The cookie holds `key || HMAC-SHA1(secret, key)`, so a cookie planted by an attacker does
//! not verify without the server [`Secret`]. The value rendered into pages is XOR-salted
//! with fresh randomness on every request. Responses therefore never repeat the token,
//! which keeps compression side channels (BREACH) from recovering it.
//!
//! Applying the layer twice to the same request is a wiring bug and is answered with
//! `500 Internal Server Error`.
//!
//! # Hosts other than tower
//! [`CsrfGuard::process`] is a pure decision over the [`CsrfRequest`] trait. Frameworks
//! that do not use `tower` can implement the trait for their request type and drive the
//! guard directly.

mod body;
mod config;
mod error;
pub mod format;
mod guard;
pub mod layer;
mod request;
mod secret;
mod token;

pub use tower_cookies::cookie::SameSite;

pub use crate::body::ParsedBody;
#[cfg(feature = "multipart")]
pub use crate::body::MultipartBody;
pub use crate::config::{
    CsrfConfig, DEFAULT_COOKIE_NAME, DEFAULT_FIELD, DEFAULT_HEADER_NAME, Expiry, SkipCheck,
};
pub use crate::error::{Error, REJECTION_MESSAGE, RejectionKind};
pub use crate::guard::{CsrfGuard, Verdict};
pub use crate::layer::{CsrfLayer, CsrfProtection};
pub use crate::request::{CsrfRequest, HttpRequest};
pub use crate::secret::Secret;
pub use crate::token::CsrfToken;

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use axum::body::Body;
    use http::{Request, Response, header};
    use time::{Duration, OffsetDateTime};
    use tower::{ServiceBuilder, ServiceExt as _};
    use tower_cookies::Cookie;

    use crate::{CsrfConfig, CsrfLayer, CsrfToken, Expiry, SameSite, Secret};

    async fn handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let token = req
            .extensions()
            .get::<CsrfToken>()
            .cloned()
            .expect("request includes CsrfToken extension");

        Ok(Response::new(Body::from(token.as_str().to_owned())))
    }

    fn get_token_cookie(res: &Response<Body>) -> Cookie<'static> {
        let set_cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .expect("response includes set-cookie header");
        let set_cookie = set_cookie
            .to_str()
            .expect("set-cookie header is valid utf-8");
        Cookie::parse_encoded(set_cookie)
            .expect("set-cookie parses successfully")
            .into_owned()
    }

    async fn issued_cookie(config: CsrfConfig) -> Cookie<'static> {
        let layer = CsrfLayer::new(Secret::generate()).with_config(config);
        let svc = ServiceBuilder::new().layer(layer).service_fn(handler);

        let req = Request::builder()
            .body(Body::empty())
            .expect("request builds successfully");
        let res = svc.oneshot(req).await.expect("service call succeeds");
        get_token_cookie(&res)
    }

    fn assert_max_age_seconds_close(cookie: &Cookie<'_>, expected_seconds: i64) {
        let actual_seconds = cookie
            .max_age()
            .expect("token cookie has max-age")
            .whole_seconds();
        assert!((actual_seconds - expected_seconds).abs() <= 1);
    }

    #[tokio::test]
    async fn basic_service_test() {
        let layer = CsrfLayer::new(Secret::generate());
        let svc = ServiceBuilder::new().layer(layer).service_fn(handler);

        let req = Request::builder()
            .body(Body::empty())
            .expect("request builds successfully");
        let res = svc
            .clone()
            .oneshot(req)
            .await
            .expect("service call succeeds");
        let token_cookie = get_token_cookie(&res);

        let req = Request::builder()
            .header(header::COOKIE, token_cookie.encoded().to_string())
            .body(Body::empty())
            .expect("request builds successfully");
        let res = svc.oneshot(req).await.expect("service call succeeds");

        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn name_test() {
        let cookie = issued_cookie(CsrfConfig::default().with_cookie_name("my.csrf")).await;
        assert_eq!(cookie.name(), "my.csrf");
    }

    #[tokio::test]
    async fn default_attributes_test() {
        let cookie = issued_cookie(CsrfConfig::default()).await;

        assert_eq!(cookie.name(), "csrfToken");
        assert_eq!(cookie.http_only(), None);
        assert_eq!(cookie.secure(), None);
        assert_eq!(cookie.same_site(), None);
        assert_eq!(cookie.path(), Some("/"));
        assert!(cookie.max_age().is_none());
    }

    #[tokio::test]
    async fn http_only_test() {
        let cookie = issued_cookie(CsrfConfig::default().with_http_only(true)).await;
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[tokio::test]
    async fn secure_test() {
        let cookie = issued_cookie(CsrfConfig::default().with_secure(true)).await;
        assert_eq!(cookie.secure(), Some(true));
    }

    #[tokio::test]
    async fn same_site_strict_test() {
        let config = CsrfConfig::default().with_same_site(SameSite::Strict);
        assert_eq!(issued_cookie(config).await.same_site(), Some(SameSite::Strict));
    }

    #[tokio::test]
    async fn same_site_lax_test() {
        let config = CsrfConfig::default().with_same_site(SameSite::Lax);
        assert_eq!(issued_cookie(config).await.same_site(), Some(SameSite::Lax));
    }

    #[tokio::test]
    async fn expiry_on_session_end_test() {
        let config = CsrfConfig::default().with_expiry(Expiry::OnSessionEnd);
        assert!(issued_cookie(config).await.max_age().is_none());
    }

    #[tokio::test]
    async fn expiry_after_duration_test() {
        let duration = Duration::hours(2);
        let config = CsrfConfig::default().with_expiry(Expiry::AfterDuration(duration));

        assert_max_age_seconds_close(&issued_cookie(config).await, duration.whole_seconds());
    }

    #[tokio::test]
    async fn expiry_at_date_time_test() {
        let expiry_time = OffsetDateTime::now_utc() + Duration::weeks(1);
        let config = CsrfConfig::default().with_expiry(Expiry::AtDateTime(expiry_time));
        let cookie = issued_cookie(config).await;

        let expected = (expiry_time - OffsetDateTime::now_utc()).whole_seconds();
        assert_max_age_seconds_close(&cookie, expected);
    }

    #[tokio::test]
    async fn path_test() {
        let cookie = issued_cookie(CsrfConfig::default().with_path("/foo/bar")).await;
        assert_eq!(cookie.path(), Some("/foo/bar"));
    }

    #[tokio::test]
    async fn domain_test() {
        let cookie = issued_cookie(CsrfConfig::default().with_domain("example.com")).await;
        assert_eq!(cookie.domain(), Some("example.com"));
    }
}
