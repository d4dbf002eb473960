use std::{borrow::Cow, fmt};

/// The salted token for the current request.
///
/// The layer inserts this into the request extensions so handlers can render it into
/// forms or pass it to client scripts. The value is re-salted on every request and always
/// unsalts to the token stored in the cookie.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken {
    value: String,
    field: Cow<'static, str>,
}

impl CsrfToken {
    pub(crate) fn new(value: String, field: Cow<'static, str>) -> Self {
        Self { value, field }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Body field the layer reads the token from.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// A hidden `<input>` carrying the token, for embedding in HTML forms.
    ///
    /// Field names are configured by the application and emitted verbatim.
    pub fn hidden_input(&self) -> String {
        format!(
            r#"<input type="hidden" name="{}" value="{}">"#,
            self.field, self.value
        )
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfToken")
            .field("value", &"***")
            .field("field", &self.field)
            .finish()
    }
}

impl fmt::Display for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(feature = "axum")]
mod extract {
    use axum_core::extract::FromRequestParts;
    use http::{StatusCode, request::Parts};

    use super::CsrfToken;

    impl<S> FromRequestParts<S> for CsrfToken
    where
        S: Send + Sync,
    {
        type Rejection = (StatusCode, &'static str);

        async fn from_request_parts(
            parts: &mut Parts,
            _state: &S,
        ) -> Result<Self, Self::Rejection> {
            parts.extensions.get::<CsrfToken>().cloned().ok_or_else(|| {
                tracing::error!("csrf token extension missing; is CsrfLayer installed?");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Can't extract CSRF token. Is `CsrfLayer` enabled?",
                )
            })
        }
    }
}
