use http::Method;
use tower_cookies::Cookie;

use crate::{
    config::CsrfConfig,
    error::{Error, RejectionKind},
    format,
    request::CsrfRequest,
    secret::Secret,
    token::CsrfToken,
};

/// What the host should do after [`CsrfGuard::process`] accepts a request.
#[derive(Debug)]
pub enum Verdict {
    /// The request matched the skip check and was not inspected.
    Skipped,
    /// Forward the request unchanged.
    Forward,
    /// Forward the request, then add this cookie to the response.
    Issue(Box<Cookie<'static>>),
}

/// Issues and validates salted double-submit tokens.
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    secret: Secret,
    config: CsrfConfig,
}

impl CsrfGuard {
    pub fn new(secret: Secret, config: CsrfConfig) -> Self {
        Self { secret, config }
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Classify `req`, attach the salted token for this request and validate it when the
    /// request carries data.
    pub fn process<R: CsrfRequest>(&self, req: &mut R) -> Result<Verdict, Error> {
        if req.has_token() {
            tracing::error!("csrf token already attached to request");
            return Err(Error::InvalidConfiguration);
        }

        let has_data = matches!(
            *req.method(),
            Method::PUT | Method::POST | Method::PATCH | Method::DELETE
        ) || req.has_body();

        if has_data
            && let Some(skip_check) = &self.config.skip_check
            && skip_check.matches(&*req)
        {
            tracing::debug!(path = req.path(), "csrf check skipped");
            req.remove_body_field(&self.config.field);
            return Ok(Verdict::Skipped);
        }

        let mut cookie_token = req
            .cookie(&self.config.cookie_name)
            .filter(|token| !token.is_empty());

        if let Some(token) = cookie_token.as_deref() {
            match format::salt_token(token) {
                Ok(salted) => req.attach_token(self.token(salted)),
                Err(err) => {
                    tracing::warn!(err = %err, "csrf cookie is not valid base64");
                    cookie_token = None;
                }
            }
        }

        if *req.method() == Method::GET && cookie_token.is_none() {
            let token = format::create_token(&self.secret);
            req.attach_token(self.token(format::salt_token(&token)?));
            tracing::debug!("issuing csrf token");
            return Ok(Verdict::Issue(Box::new(self.config.build_cookie(token))));
        }

        if has_data {
            if let Err(err) = self.validate(&*req) {
                tracing::debug!(path = req.path(), kind = ?err.kind(), "csrf validation failed");
                return Err(err);
            }
            req.remove_body_field(&self.config.field);
        }

        Ok(Verdict::Forward)
    }

    /// Check the submitted token against the cookie.
    ///
    /// The body field is consulted first; the header is only checked when the field is
    /// missing or does not match.
    pub fn validate<R: CsrfRequest + ?Sized>(&self, req: &R) -> Result<(), Error> {
        let cookie = req
            .cookie(&self.config.cookie_name)
            .filter(|cookie| !cookie.is_empty())
            .ok_or_else(|| Error::rejected(RejectionKind::MissingCookie))?;

        if !format::verify_token(&self.secret, &cookie) {
            return Err(Error::rejected_with_expired_cookie(
                RejectionKind::InvalidCookie,
                self.config.build_expired_cookie(),
            ));
        }

        let submitted = [
            req.body_field(&self.config.field),
            req.header(&self.config.header_name),
        ];

        let matched = submitted
            .into_iter()
            .flatten()
            .any(|token| format::tokens_match(&format::unsalt_token(token), &cookie));

        if matched {
            Ok(())
        } else {
            Err(Error::rejected(RejectionKind::TokenMismatch))
        }
    }

    fn token(&self, salted: String) -> CsrfToken {
        CsrfToken::new(salted, self.config.field.clone())
    }
}
