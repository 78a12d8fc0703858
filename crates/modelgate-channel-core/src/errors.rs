use serde_json::Value as JsonValue;

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// Stored secret is malformed or incomplete. Local, never sent upstream.
    #[error("invalid credential: {0}")]
    CredentialFormat(String),
    /// Non-2xx from the OAuth2 token endpoint.
    #[error("token exchange failed: status {status}: {message}")]
    TokenExchange { status: u16, message: String },
    /// Strict redirect rejection; surfaces as a client-facing error.
    #[error("model '{0}' is not configured in redirect rules")]
    ModelNotConfigured(String),
    #[error("unable to infer vertex location from upstream host/path")]
    LocationInference,
    #[error("missing project_id (not found in upstream url path or service account json)")]
    ProjectInference,
    /// Key parsing or cryptographic signing failure; treated as credential-invalid.
    #[error("signing failed: {0}")]
    Signing(String),
    /// Non-2xx from the vendor itself, with a best-effort parsed message.
    #[error("upstream error: status {status}: {message}")]
    Upstream { status: u16, message: String },
    /// Request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid group config: {0}")]
    InvalidGroup(String),
    #[error("{0}")]
    Other(String),
}

/// Wraps a non-2xx vendor response into [`ChannelError::Upstream`].
pub fn parse_upstream_error(status: u16, body: &[u8]) -> ChannelError {
    ChannelError::Upstream {
        status,
        message: upstream_error_message(status, body),
    }
}

/// Best-effort extraction of a human-readable message from a vendor error
/// body. Falls back to the status line when the body is not a recognized
/// structured error.
pub fn upstream_error_message(status: u16, body: &[u8]) -> String {
    structured_error_message(body).unwrap_or_else(|| format!("HTTP {status}"))
}

fn structured_error_message(body: &[u8]) -> Option<String> {
    let parsed: JsonValue = serde_json::from_slice(body).ok()?;
    // Gemini batch endpoints wrap the error object in a one-element array.
    let value = match parsed.as_array() {
        Some(entries) => entries.first()?,
        None => &parsed,
    };
    // OpenAI / Gemini / Anthropic wrap errors as {"error": {"message": ...}}.
    if let Some(message) = value.pointer("/error/message").and_then(JsonValue::as_str) {
        return Some(message.to_string());
    }
    // OAuth2 token endpoints answer {"error": "...", "error_description": "..."}.
    if let Some(code) = value.get("error").and_then(JsonValue::as_str) {
        if let Some(description) = value.get("error_description").and_then(JsonValue::as_str) {
            return Some(format!("{code}: {description}"));
        }
        return Some(code.to_string());
    }
    value
        .get("message")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_error_message() {
        let body = br#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(upstream_error_message(400, body), "API key not valid");
    }

    #[test]
    fn extracts_oauth_error_with_description() {
        let body = br#"{"error":"invalid_grant","error_description":"Invalid JWT Signature."}"#;
        assert_eq!(
            upstream_error_message(400, body),
            "invalid_grant: Invalid JWT Signature."
        );
    }

    #[test]
    fn extracts_top_level_message() {
        let body = br#"{"message":"service unavailable"}"#;
        assert_eq!(upstream_error_message(503, body), "service unavailable");
    }

    #[test]
    fn extracts_first_entry_of_an_error_array() {
        let body = br#"[{"error":{"code":429,"message":"Resource exhausted"}}]"#;
        assert_eq!(upstream_error_message(429, body), "Resource exhausted");
        assert_eq!(upstream_error_message(500, b"[]"), "HTTP 500");
    }

    #[test]
    fn unparseable_body_reports_status_line() {
        assert_eq!(upstream_error_message(502, b"<html>bad gateway</html>"), "HTTP 502");
        assert_eq!(upstream_error_message(500, b""), "HTTP 500");
        // Valid JSON without a recognized message field is treated the same way.
        assert_eq!(upstream_error_message(500, br#"{"detail":[1,2]}"#), "HTTP 500");
    }

    #[test]
    fn upstream_error_carries_status() {
        let err = parse_upstream_error(429, br#"{"error":{"message":"quota"}}"#);
        match err {
            ChannelError::Upstream { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "quota");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
