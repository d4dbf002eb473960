use std::{borrow::Cow, fmt, sync::Arc};

use time::{Duration, OffsetDateTime};
use tower_cookies::Cookie;

use crate::{SameSite, request::CsrfRequest};

pub const DEFAULT_COOKIE_NAME: &str = "csrfToken";
pub const DEFAULT_FIELD: &str = "_csrfToken";
pub const DEFAULT_HEADER_NAME: &str = "X-CSRF-Token";

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Lifetime of the token cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// No `Max-Age`; the browser drops the cookie when the session ends.
    #[default]
    OnSessionEnd,
    /// The cookie expires this long after it was issued.
    AfterDuration(Duration),
    /// The cookie expires at a fixed instant.
    AtDateTime(OffsetDateTime),
}

/// Predicate deciding whether a data-bearing request bypasses the token check.
#[derive(Clone)]
pub struct SkipCheck(Arc<dyn Fn(&dyn CsrfRequest) -> bool + Send + Sync>);

impl SkipCheck {
    pub(crate) fn matches(&self, req: &dyn CsrfRequest) -> bool {
        (self.0)(req)
    }
}

impl fmt::Debug for SkipCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SkipCheck(..)")
    }
}

#[derive(Debug, Clone)]
pub struct CsrfConfig {
    pub(crate) cookie_name: Cow<'static, str>,
    pub(crate) expiry: Expiry,
    pub(crate) secure: bool,
    pub(crate) http_only: bool,
    pub(crate) same_site: Option<SameSite>,
    pub(crate) path: Cow<'static, str>,
    pub(crate) domain: Option<Cow<'static, str>>,
    pub(crate) field: Cow<'static, str>,
    pub(crate) header_name: Cow<'static, str>,
    pub(crate) max_body_bytes: usize,
    pub(crate) skip_check: Option<SkipCheck>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.into(),
            expiry: Expiry::OnSessionEnd,
            secure: false,
            http_only: false,
            same_site: None,
            path: "/".into(),
            domain: None,
            field: DEFAULT_FIELD.into(),
            header_name: DEFAULT_HEADER_NAME.into(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            skip_check: None,
        }
    }
}

impl CsrfConfig {
    #[must_use]
    pub fn with_cookie_name<N: Into<Cow<'static, str>>>(mut self, name: N) -> Self {
        self.cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    #[must_use]
    pub fn without_same_site(mut self) -> Self {
        self.same_site = None;
        self
    }

    #[must_use]
    pub fn with_path<P: Into<Cow<'static, str>>>(mut self, path: P) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_domain<D: Into<Cow<'static, str>>>(mut self, domain: D) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn without_domain(mut self) -> Self {
        self.domain = None;
        self
    }

    /// Name of the body field carrying the salted token.
    ///
    /// For JSON bodies a dotted name (`"meta.csrf"`) addresses a nested object member.
    #[must_use]
    pub fn with_field<F: Into<Cow<'static, str>>>(mut self, field: F) -> Self {
        self.field = field.into();
        self
    }

    #[must_use]
    pub fn with_header_name<H: Into<Cow<'static, str>>>(mut self, header_name: H) -> Self {
        self.header_name = header_name.into();
        self
    }

    /// Upper bound on request bodies buffered to look for the token field.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Exempt matching data-bearing requests from validation, e.g. webhook receivers.
    ///
    /// Skipped requests still have the token field stripped from their body.
    #[must_use]
    pub fn with_skip_check<F>(mut self, skip_check: F) -> Self
    where
        F: Fn(&dyn CsrfRequest) -> bool + Send + Sync + 'static,
    {
        self.skip_check = Some(SkipCheck(Arc::new(skip_check)));
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    pub(crate) fn build_cookie(&self, value: String) -> Cookie<'static> {
        let mut cookie_builder = Cookie::build((self.cookie_name.clone(), value))
            .http_only(self.http_only)
            .secure(self.secure)
            .path(self.path.clone());

        if let Some(same_site) = self.same_site {
            cookie_builder = cookie_builder.same_site(same_site);
        }

        match self.expiry {
            Expiry::AfterDuration(duration) => {
                cookie_builder = cookie_builder.max_age(duration);
            }
            Expiry::AtDateTime(at) => {
                let max_age = std::cmp::max(at - OffsetDateTime::now_utc(), Duration::ZERO);
                cookie_builder = cookie_builder.max_age(max_age);
            }
            Expiry::OnSessionEnd => {}
        }

        if let Some(domain) = self.domain.clone() {
            cookie_builder = cookie_builder.domain(domain);
        }

        cookie_builder.build()
    }

    pub(crate) fn build_expired_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.build_cookie(String::new());
        cookie.make_removal();
        cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cookie = CsrfConfig::default().build_cookie("value".into());

        assert_eq!(cookie.name(), DEFAULT_COOKIE_NAME);
        assert_eq!(cookie.value(), "value");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.same_site(), None);
        assert_eq!(cookie.max_age(), None);
        assert_eq!(cookie.domain(), None);
        assert_ne!(cookie.secure(), Some(true));
        assert_ne!(cookie.http_only(), Some(true));
    }

    #[test]
    fn after_duration_sets_max_age() {
        let cookie = CsrfConfig::default()
            .with_expiry(Expiry::AfterDuration(Duration::hours(2)))
            .build_cookie("value".into());

        assert_eq!(cookie.max_age(), Some(Duration::hours(2)));
    }

    #[test]
    fn past_date_time_clamps_to_zero() {
        let cookie = CsrfConfig::default()
            .with_expiry(Expiry::AtDateTime(OffsetDateTime::now_utc() - Duration::days(1)))
            .build_cookie("value".into());

        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }

    #[test]
    fn expired_cookie_keeps_scope() {
        let cookie = CsrfConfig::default()
            .with_path("/app")
            .with_domain("example.com")
            .build_expired_cookie();

        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.path(), Some("/app"));
        assert_eq!(cookie.domain(), Some("example.com"));
    }
}
