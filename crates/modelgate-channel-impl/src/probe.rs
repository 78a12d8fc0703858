use bytes::Bytes;
use tracing::debug;

use modelgate_channel_core::{ChannelError, ChannelResult, Headers, parse_upstream_error};

use crate::http_client::{SharedClientKind, shared_client};

pub(crate) struct ProbeRequest {
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
}

/// Joins an upstream base URL with a probe path.
pub(crate) fn join_probe_url(upstream_url: &str, path: &str) -> String {
    let base = upstream_url.trim().trim_end_matches('/');
    let path = path.trim();
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Sends the probe and classifies the outcome: any 2xx means the credential
/// is accepted, anything else carries the parsed upstream error.
pub(crate) async fn run_probe(channel: &'static str, probe: ProbeRequest) -> ChannelResult<()> {
    let client = shared_client(SharedClientKind::Probe)?;
    let mut request = client.post(probe.url.as_str());
    for (name, value) in &probe.headers {
        request = request.header(name, value);
    }
    let response = request
        .body(probe.body)
        .send()
        .await
        .map_err(|err| ChannelError::Transport(format!("failed to send validation request: {err}")))?;

    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(());
    }
    let body = response.bytes().await.unwrap_or_default();
    debug!(channel, status, "validation probe rejected");
    Err(parse_upstream_error(status, &body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_probe_url_normalizes_slashes() {
        assert_eq!(
            join_probe_url("https://api.example.com/", "/v1/messages"),
            "https://api.example.com/v1/messages"
        );
        assert_eq!(
            join_probe_url("https://api.example.com", "v1/messages"),
            "https://api.example.com/v1/messages"
        );
        assert_eq!(
            join_probe_url(" https://api.example.com/v1beta/ ", "/models/m:generateContent"),
            "https://api.example.com/v1beta/models/m:generateContent"
        );
    }
}
