//! Request primitives the lab handles are built on.
//!
//! [`Transport`] is the seam between lab logic and the wire: handles only
//! ever ask for "send this JSON, give me JSON back" or "send this JSON,
//! expect nothing". [`HttpTransport`] is the real implementation.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{LabError, LabResult};
use crate::http_client;

const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// HTTP verbs used by the public API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A path below the API root, kept as raw segments so each one is encoded once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiPath {
    segments: Vec<String>,
}

impl ApiPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Return a new path with `segment` appended.
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Authenticated, error-raising request primitives.
pub trait Transport: Send + Sync {
    /// Send a request and decode the JSON response body.
    fn perform_json(&self, method: Method, path: &ApiPath, body: Option<&Value>)
    -> LabResult<Value>;

    /// Send a request whose response body carries nothing of interest.
    fn perform_empty(&self, method: Method, path: &ApiPath, body: Option<&Value>)
    -> LabResult<()>;
}

/// [`Transport`] over blocking HTTP against `{base_url}/public/api`.
#[derive(Debug)]
pub struct HttpTransport {
    agent: ureq::Agent,
    api_root: Url,
    authorization: Option<String>,
    max_response_bytes: usize,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> LabResult<Self> {
        config.validate()?;
        let mut api_root = Url::parse(config.base_url.trim())
            .map_err(|err| LabError::Transport(err.to_string()))?;
        push_segments(&mut api_root, ["public", "api"])?;
        let authorization = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(basic_authorization);
        Ok(Self {
            agent: http_client::agent(&config.http),
            api_root,
            authorization,
            max_response_bytes: config.http.max_response_bytes,
        })
    }

    /// Absolute URL a path resolves to.
    pub fn url_for(&self, path: &ApiPath) -> LabResult<Url> {
        let mut url = self.api_root.clone();
        push_segments(&mut url, path.segments())?;
        Ok(url)
    }

    fn send(&self, method: Method, path: &ApiPath, body: Option<&Value>) -> LabResult<ureq::Response> {
        let url = self.url_for(path)?;
        tracing::debug!(%method, %path, "lab request");
        let mut request = self
            .agent
            .request_url(method.as_str(), &url)
            .set("Accept", "application/json");
        if let Some(authorization) = &self.authorization {
            request = request.set("Authorization", authorization);
        }
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        match result {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(code, response)) => {
                let body = http_client::read_error_text(response, MAX_ERROR_BODY_BYTES);
                tracing::warn!(%method, %path, status = code, "lab request failed");
                Err(map_status_error(code, &body))
            }
            Err(ureq::Error::Transport(err)) => Err(LabError::Transport(err.to_string())),
        }
    }
}

impl Transport for HttpTransport {
    fn perform_json(
        &self,
        method: Method,
        path: &ApiPath,
        body: Option<&Value>,
    ) -> LabResult<Value> {
        let response = self.send(method, path, body)?;
        let bytes = http_client::read_body(response, self.max_response_bytes)?;
        parse_json_body(&bytes)
    }

    fn perform_empty(
        &self,
        method: Method,
        path: &ApiPath,
        body: Option<&Value>,
    ) -> LabResult<()> {
        let response = self.send(method, path, body)?;
        http_client::read_body(response, self.max_response_bytes)?;
        Ok(())
    }
}

fn push_segments<I, S>(url: &mut Url, segments: I) -> LabResult<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut path = url
        .path_segments_mut()
        .map_err(|_| LabError::Transport("Base URL cannot carry a path".to_string()))?;
    path.pop_if_empty();
    for segment in segments {
        path.push(segment.as_ref());
    }
    Ok(())
}

fn basic_authorization(api_key: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{api_key}:")))
}

fn parse_json_body(bytes: &[u8]) -> LabResult<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|err| LabError::Json(err.to_string()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBodyWire {
    error_type: Option<String>,
    message: Option<String>,
    detailed_message: Option<String>,
}

fn map_status_error(status: u16, body: &str) -> LabError {
    let trimmed = body.trim();
    let message = serde_json::from_str::<ErrorBodyWire>(trimmed)
        .ok()
        .and_then(|wire| {
            let message = wire.message.or(wire.detailed_message)?;
            Some(match wire.error_type {
                Some(kind) => format!("{kind}: {message}"),
                None => message,
            })
        })
        .unwrap_or_else(|| trimmed.to_string());
    LabError::Http { status, message }
}
