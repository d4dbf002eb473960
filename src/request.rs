use http::{Method, request::Parts};
use tower_cookies::Cookies;

use crate::{body::ParsedBody, token::CsrfToken};

/// What the guard needs to read from and write to a request.
///
/// Hosts other than `tower` implement this over their own request type and drive
/// [`CsrfGuard::process`](crate::CsrfGuard::process) directly.
pub trait CsrfRequest {
    fn method(&self) -> &Method;

    fn path(&self) -> &str;

    fn header(&self, name: &str) -> Option<&str>;

    fn cookie(&self, name: &str) -> Option<String>;

    /// Whether a parsed body with at least one field is present.
    fn has_body(&self) -> bool;

    fn body_field(&self, field: &str) -> Option<&str>;

    fn remove_body_field(&mut self, field: &str);

    /// Whether a token was already attached to this request.
    fn has_token(&self) -> bool;

    fn attach_token(&mut self, token: CsrfToken);
}

/// [`CsrfRequest`] over `http` request parts and a `tower-cookies` jar.
pub struct HttpRequest<'a> {
    parts: &'a mut Parts,
    cookies: &'a Cookies,
    body: Option<ParsedBody>,
    body_modified: bool,
}

impl<'a> HttpRequest<'a> {
    pub fn new(parts: &'a mut Parts, cookies: &'a Cookies, body: Option<ParsedBody>) -> Self {
        Self {
            parts,
            cookies,
            body,
            body_modified: false,
        }
    }

    /// The parsed body if the guard edited it.
    pub fn into_modified_body(self) -> Option<ParsedBody> {
        let modified = self.body_modified;
        self.body.filter(|_| modified)
    }
}

impl CsrfRequest for HttpRequest<'_> {
    fn method(&self) -> &Method {
        &self.parts.method
    }

    fn path(&self) -> &str {
        self.parts.uri.path()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.get(name).map(|cookie| cookie.value().to_owned())
    }

    fn has_body(&self) -> bool {
        self.body.as_ref().is_some_and(|body| !body.is_empty())
    }

    fn body_field(&self, field: &str) -> Option<&str> {
        self.body.as_ref()?.get(field)
    }

    fn remove_body_field(&mut self, field: &str) {
        if let Some(body) = self.body.as_mut() {
            self.body_modified |= body.remove(field);
        }
    }

    fn has_token(&self) -> bool {
        self.parts.extensions.get::<CsrfToken>().is_some()
    }

    fn attach_token(&mut self, token: CsrfToken) {
        self.parts.extensions.insert(token);
    }
}
