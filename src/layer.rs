use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use tower_cookies::{CookieManager, Cookies};
use tower_layer::Layer;
use tower_service::Service;

use crate::{
    body::{self, BodyError},
    config::CsrfConfig,
    guard::{CsrfGuard, Verdict},
    request::HttpRequest,
    secret::Secret,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CsrfLayer {
    secret: Secret,
    config: CsrfConfig,
}

impl CsrfLayer {
    #[must_use]
    pub fn new(secret: Secret) -> Self {
        Self {
            secret,
            config: CsrfConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: CsrfConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CsrfProtection<S> {
    inner: S,
    guard: Arc<CsrfGuard>,
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CookieManager<CsrfProtection<S>>;

    fn layer(&self, inner: S) -> Self::Service {
        CookieManager::new(CsrfProtection {
            inner,
            guard: Arc::new(CsrfGuard::new(self.secret.clone(), self.config.clone())),
        })
    }
}

fn plain_response<B>(status: StatusCode, message: &'static str) -> Response<B>
where
    B: From<&'static str>,
{
    let mut res = Response::new(B::from(message));
    *res.status_mut() = status;
    res
}

impl<ReqBody, ResBody, S> Service<Request<ReqBody>> for CsrfProtection<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: http_body::Body<Data = Bytes> + From<Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: From<&'static str> + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let guard = self.guard.clone();

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let Some(cookies) = req.extensions().get::<Cookies>().cloned() else {
                tracing::error!("cookie jar missing from request extensions");
                return Ok(plain_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                ));
            };

            let (mut parts, body) = req.into_parts();
            let limit = guard.config().max_body_bytes;
            let (parsed, mut body) = match body::read_body(&parts.headers, body, limit).await {
                Ok(read) => read,
                Err(BodyError::TooLarge { limit }) => {
                    tracing::warn!(limit, "request body too large for csrf inspection");
                    return Ok(plain_response(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "Payload Too Large",
                    ));
                }
                Err(err) => {
                    tracing::warn!(err = %err, "failed to buffer request body");
                    return Ok(plain_response(StatusCode::BAD_REQUEST, "Bad Request"));
                }
            };

            let mut request = HttpRequest::new(&mut parts, &cookies, parsed);
            let verdict = match guard.process(&mut request) {
                Ok(verdict) => verdict,
                Err(mut err) => {
                    if let Some(expired) = err.take_expired_cookie() {
                        cookies.add(expired);
                    }
                    return Ok(err.into_response());
                }
            };

            if let Some(edited) = request.into_modified_body()
                && let Some(replaced) = body::replace_body(&mut parts.headers, &edited)
            {
                body = replaced;
            }

            let res = inner.call(Request::from_parts(parts, body)).await?;

            if let Verdict::Issue(cookie) = verdict {
                cookies.add(*cookie);
            }

            Ok(res)
        })
    }
}
