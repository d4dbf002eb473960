use http::{HeaderValue, Response, StatusCode, header};
use tower_cookies::Cookie;

/// User-facing message for every token failure.
pub const REJECTION_MESSAGE: &str = "invalid or missing CSRF token";

const CONFIGURATION_MESSAGE: &str = "CSRF protection misconfigured";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The guard ran twice for the same request.
    #[error("a CSRF token is already attached to the request; the CSRF layer is applied more than once")]
    InvalidConfiguration,

    /// The request failed token validation.
    #[error("invalid or missing CSRF token")]
    MissingOrInvalidToken {
        kind: RejectionKind,
        expired_cookie: Option<Box<Cookie<'static>>>,
    },

    /// A token could not be base64-decoded while salting.
    #[error("invalid or missing CSRF token")]
    MalformedTokenEncoding(#[source] base64::DecodeError),
}

/// Which check rejected a request. Internal detail: never rendered to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    MissingCookie,
    InvalidCookie,
    TokenMismatch,
}

impl Error {
    pub(crate) fn rejected(kind: RejectionKind) -> Self {
        Self::MissingOrInvalidToken {
            kind,
            expired_cookie: None,
        }
    }

    pub(crate) fn rejected_with_expired_cookie(
        kind: RejectionKind,
        cookie: Cookie<'static>,
    ) -> Self {
        Self::MissingOrInvalidToken {
            kind,
            expired_cookie: Some(Box::new(cookie)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<RejectionKind> {
        match self {
            Self::MissingOrInvalidToken { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Removal cookie that should accompany the error response, if any.
    #[must_use]
    pub fn expired_cookie(&self) -> Option<&Cookie<'static>> {
        match self {
            Self::MissingOrInvalidToken { expired_cookie, .. } => expired_cookie.as_deref(),
            _ => None,
        }
    }

    /// Take the removal cookie out of the error so it can be set through a cookie jar.
    pub fn take_expired_cookie(&mut self) -> Option<Cookie<'static>> {
        match self {
            Self::MissingOrInvalidToken { expired_cookie, .. } => {
                expired_cookie.take().map(|cookie| *cookie)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidConfiguration => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingOrInvalidToken { .. } | Self::MalformedTokenEncoding(_) => {
                StatusCode::FORBIDDEN
            }
        }
    }

    /// Render the error as a plain-text response, including any removal cookie still held.
    pub fn into_response<B: From<&'static str>>(self) -> Response<B> {
        let message = match &self {
            Self::InvalidConfiguration => CONFIGURATION_MESSAGE,
            _ => REJECTION_MESSAGE,
        };

        let mut res = Response::new(B::from(message));
        *res.status_mut() = self.status_code();
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );

        if let Some(cookie) = self.expired_cookie() {
            match HeaderValue::try_from(cookie.to_string()) {
                Ok(value) => {
                    res.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(err) => tracing::warn!(err = %err, "expired csrf cookie is not a valid header"),
            }
        }

        res
    }
}
