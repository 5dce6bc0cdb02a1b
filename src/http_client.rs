//! ureq agent construction and size-capped body reads for the public API.

use std::io::Read;
use std::time::Duration;

use crate::config::HttpSettings;
use crate::error::{LabError, LabResult};

const USER_AGENT: &str = concat!("mllab/", env!("CARGO_PKG_VERSION"));

/// Agent with the configured timeouts. Redirects are not followed since
/// they would drop the authorization header.
pub(crate) fn agent(settings: &HttpSettings) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(settings.connect_timeout_secs))
        .timeout_read(Duration::from_secs(settings.read_timeout_secs))
        .timeout_write(Duration::from_secs(settings.write_timeout_secs))
        .redirects(0)
        .user_agent(USER_AGENT)
        .build()
}

/// Read a whole response body, failing once it grows past `max_bytes`.
pub(crate) fn read_body(response: ureq::Response, max_bytes: usize) -> LabResult<Vec<u8>> {
    if let Some(declared) = declared_length(&response)
        && declared > max_bytes as u64
    {
        return Err(too_large(declared));
    }
    let mut body = Vec::new();
    response
        .into_reader()
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|err| LabError::Transport(format!("Failed to read response: {err}")))?;
    if body.len() > max_bytes {
        return Err(too_large(body.len() as u64));
    }
    Ok(body)
}

/// Text of an error response, cut at `max_bytes`. Never fails: whatever
/// could be read is returned.
pub(crate) fn read_error_text(response: ureq::Response, max_bytes: usize) -> String {
    let mut body = Vec::new();
    let _ = response
        .into_reader()
        .take(max_bytes as u64)
        .read_to_end(&mut body);
    String::from_utf8_lossy(&body).into_owned()
}

fn declared_length(response: &ureq::Response) -> Option<u64> {
    response.header("Content-Length")?.trim().parse().ok()
}

fn too_large(size: u64) -> LabError {
    LabError::Transport(format!("Response too large: {size} bytes"))
}
