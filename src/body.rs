//! Buffering and editing of parsed request bodies.
//!
//! Only bodies the token can travel in are buffered: urlencoded forms, (with the `json`
//! feature) JSON documents and (with the `multipart` feature) `multipart/form-data`.
//! Bodies of any other type, or whose declared length is unknown or above the limit, stream
//! through untouched.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, header};
use http_body::Body;
use http_body_util::{BodyExt as _, LengthLimitError, Limited};

#[cfg(feature = "multipart")]
pub use self::multipart::MultipartBody;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A request body decoded into fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Form(Vec<(String, String)>),
    #[cfg(feature = "json")]
    Json(serde_json::Value),
    #[cfg(feature = "multipart")]
    Multipart(MultipartBody),
}

impl ParsedBody {
    /// Parse `bytes` according to the request `Content-Type`.
    ///
    /// Returns `None` for content types that are not parsed or payloads that do not decode.
    pub async fn parse(headers: &HeaderMap, bytes: Bytes) -> Option<Self> {
        match BodyKind::from_headers(headers)? {
            BodyKind::Form => match serde_urlencoded::from_bytes(&bytes) {
                Ok(pairs) => Some(Self::Form(pairs)),
                Err(err) => {
                    tracing::debug!(err = %err, "urlencoded body did not parse");
                    None
                }
            },
            #[cfg(feature = "json")]
            BodyKind::Json => {
                if bytes.is_empty() {
                    return None;
                }
                match serde_json::from_slice(&bytes) {
                    Ok(value) => Some(Self::Json(value)),
                    Err(err) => {
                        tracing::debug!(err = %err, "json body did not parse");
                        None
                    }
                }
            }
            #[cfg(feature = "multipart")]
            BodyKind::Multipart => {
                let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
                match MultipartBody::parse(content_type, bytes).await {
                    Ok(body) => Some(Self::Multipart(body)),
                    Err(err) => {
                        tracing::debug!(err = %err, "multipart body did not parse");
                        None
                    }
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Form(pairs) => pairs.is_empty(),
            #[cfg(feature = "json")]
            Self::Json(value) => match value {
                serde_json::Value::Null => true,
                serde_json::Value::Object(map) => map.is_empty(),
                serde_json::Value::Array(items) => items.is_empty(),
                _ => false,
            },
            #[cfg(feature = "multipart")]
            Self::Multipart(body) => body.is_empty(),
        }
    }

    /// String value stored under `field`.
    pub fn get(&self, field: &str) -> Option<&str> {
        match self {
            Self::Form(pairs) => pairs
                .iter()
                .find(|(name, _)| name == field)
                .map(|(_, value)| value.as_str()),
            #[cfg(feature = "json")]
            Self::Json(value) => field
                .split('.')
                .try_fold(value, |value, segment| value.get(segment))
                .and_then(serde_json::Value::as_str),
            #[cfg(feature = "multipart")]
            Self::Multipart(body) => body.text_field(field),
        }
    }

    /// Remove `field`, returning whether anything was removed.
    pub fn remove(&mut self, field: &str) -> bool {
        match self {
            Self::Form(pairs) => {
                let before = pairs.len();
                pairs.retain(|(name, _)| name != field);
                pairs.len() != before
            }
            #[cfg(feature = "json")]
            Self::Json(value) => {
                let (parent, last) = match field.rsplit_once('.') {
                    Some((parent, last)) => (
                        parent
                            .split('.')
                            .try_fold(value, |value, segment| value.get_mut(segment)),
                        last,
                    ),
                    None => (Some(value), field),
                };

                parent
                    .and_then(serde_json::Value::as_object_mut)
                    .is_some_and(|map| map.remove(last).is_some())
            }
            #[cfg(feature = "multipart")]
            Self::Multipart(body) => body.remove(field),
        }
    }

    /// Serialize back into the wire format it was parsed from.
    pub fn encode(&self) -> Option<Bytes> {
        match self {
            Self::Form(pairs) => match serde_urlencoded::to_string(pairs) {
                Ok(encoded) => Some(Bytes::from(encoded)),
                Err(err) => {
                    tracing::warn!(err = %err, "urlencoded body did not re-encode");
                    None
                }
            },
            #[cfg(feature = "json")]
            Self::Json(value) => match serde_json::to_vec(value) {
                Ok(encoded) => Some(Bytes::from(encoded)),
                Err(err) => {
                    tracing::warn!(err = %err, "json body did not re-encode");
                    None
                }
            },
            #[cfg(feature = "multipart")]
            Self::Multipart(body) => Some(body.encode()),
        }
    }
}

#[cfg(feature = "multipart")]
mod multipart {
    use std::convert::Infallible;

    use bytes::{BufMut as _, Bytes, BytesMut};
    use futures_util::{future, stream};
    use http::HeaderMap;

    /// A `multipart/form-data` body split into its parts.
    #[derive(Debug, Clone, PartialEq)]
    pub struct MultipartBody {
        boundary: String,
        parts: Vec<Part>,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Part {
        name: Option<String>,
        file_name: Option<String>,
        headers: HeaderMap,
        data: Bytes,
    }

    impl MultipartBody {
        pub(super) async fn parse(content_type: &str, bytes: Bytes) -> Result<Self, multer::Error> {
            let boundary = multer::parse_boundary(content_type)?;
            let stream = stream::once(future::ready(Ok::<_, Infallible>(bytes)));
            let mut multipart = multer::Multipart::new(stream, boundary.clone());

            let mut parts = Vec::new();
            while let Some(field) = multipart.next_field().await? {
                let name = field.name().map(str::to_owned);
                let file_name = field.file_name().map(str::to_owned);
                let headers = field.headers().clone();
                let data = field.bytes().await?;
                parts.push(Part {
                    name,
                    file_name,
                    headers,
                    data,
                });
            }

            Ok(Self { boundary, parts })
        }

        pub fn boundary(&self) -> &str {
            &self.boundary
        }

        pub fn is_empty(&self) -> bool {
            self.parts.is_empty()
        }

        /// Value of the first non-file part named `name`, if it is valid UTF-8.
        pub fn text_field(&self, name: &str) -> Option<&str> {
            self.parts
                .iter()
                .find(|part| part.file_name.is_none() && part.name.as_deref() == Some(name))
                .and_then(|part| std::str::from_utf8(&part.data).ok())
        }

        pub(super) fn remove(&mut self, name: &str) -> bool {
            let before = self.parts.len();
            self.parts.retain(|part| part.name.as_deref() != Some(name));
            self.parts.len() != before
        }

        pub(super) fn encode(&self) -> Bytes {
            let mut out = BytesMut::new();
            for part in &self.parts {
                out.put_slice(b"--");
                out.put_slice(self.boundary.as_bytes());
                out.put_slice(b"\r\n");
                for (name, value) in &part.headers {
                    out.put_slice(name.as_str().as_bytes());
                    out.put_slice(b": ");
                    out.put_slice(value.as_bytes());
                    out.put_slice(b"\r\n");
                }
                out.put_slice(b"\r\n");
                out.put_slice(&part.data);
                out.put_slice(b"\r\n");
            }
            out.put_slice(b"--");
            out.put_slice(self.boundary.as_bytes());
            out.put_slice(b"--\r\n");
            out.freeze()
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BodyKind {
    Form,
    #[cfg(feature = "json")]
    Json,
    #[cfg(feature = "multipart")]
    Multipart,
}

impl BodyKind {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let essence = content_type.split(';').next()?.trim();

        if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            return Some(Self::Form);
        }

        #[cfg(feature = "json")]
        if essence.eq_ignore_ascii_case("application/json")
            || essence.to_ascii_lowercase().ends_with("+json")
        {
            return Some(Self::Json);
        }

        #[cfg(feature = "multipart")]
        if essence.eq_ignore_ascii_case("multipart/form-data") {
            return Some(Self::Multipart);
        }

        None
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Read(BoxError),
}

/// Length the body announces through its size hint or `Content-Length`.
fn declared_length<B: Body>(headers: &HeaderMap, body: &B) -> Option<u64> {
    body.size_hint().upper().or_else(|| {
        headers
            .get(header::CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    })
}

/// Buffer `body` if its content type can carry a token and parse it.
///
/// Bodies without a declared length, or declaring more than `limit` bytes, are returned
/// untouched and unparsed. The returned body replays the buffered bytes for the inner
/// service.
pub(crate) async fn read_body<B>(
    headers: &HeaderMap,
    body: B,
    limit: usize,
) -> Result<(Option<ParsedBody>, B), BodyError>
where
    B: Body<Data = Bytes> + From<Bytes>,
    B::Error: Into<BoxError>,
{
    if BodyKind::from_headers(headers).is_none() {
        return Ok((None, body));
    }

    let declared = declared_length(headers, &body);
    if declared.is_none_or(|len| len > limit as u64) {
        tracing::debug!(?declared, limit, "request body not buffered for csrf inspection");
        return Ok((None, body));
    }

    // A body can still stream more than it declared.
    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.is::<LengthLimitError>() => return Err(BodyError::TooLarge { limit }),
        Err(err) => return Err(BodyError::Read(err)),
    };

    let parsed = ParsedBody::parse(headers, bytes.clone()).await;
    Ok((parsed, B::from(bytes)))
}

/// Re-encode an edited body and fix up the framing headers.
pub(crate) fn replace_body<B: From<Bytes>>(
    headers: &mut HeaderMap,
    parsed: &ParsedBody,
) -> Option<B> {
    let encoded = parsed.encode()?;
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(encoded.len()));
    Some(B::from(encoded))
}
