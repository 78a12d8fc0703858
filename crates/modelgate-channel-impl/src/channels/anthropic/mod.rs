use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use tracing::debug;

use modelgate_channel_core::{
    ChannelError, ChannelGroup, ChannelProxy, ChannelResult, Credential, Headers, OutboundRequest,
    header_set,
};

use crate::base;
use crate::probe::{self, ProbeRequest};
use crate::upstream::{require_upstreams, select_upstream};

pub(crate) const CHANNEL_NAME: &str = "anthropic";
const DEFAULT_TEST_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_VALIDATION_PATH: &str = "/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Default)]
pub struct AnthropicChannel;

impl AnthropicChannel {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn build(group: &ChannelGroup) -> ChannelResult<Arc<dyn ChannelProxy>> {
    require_upstreams(group)?;
    Ok(Arc::new(AnthropicChannel::new()))
}

fn set_auth_headers(headers: &mut Headers, credential: &Credential) {
    header_set(headers, "x-api-key", credential.secret.clone());
    header_set(headers, "anthropic-version", ANTHROPIC_VERSION);
}

#[async_trait::async_trait]
impl ChannelProxy for AnthropicChannel {
    fn name(&self) -> &'static str {
        CHANNEL_NAME
    }

    async fn modify_request(
        &self,
        req: &mut OutboundRequest,
        credential: &Credential,
        _group: &ChannelGroup,
    ) -> ChannelResult<()> {
        set_auth_headers(&mut req.headers, credential);
        Ok(())
    }

    fn is_stream_request(&self, req: &OutboundRequest) -> bool {
        base::is_stream_request(req, &[])
    }

    fn extract_model(&self, req: &OutboundRequest) -> Option<String> {
        base::extract_model(req)
    }

    fn apply_model_redirect(
        &self,
        req: &mut OutboundRequest,
        group: &ChannelGroup,
    ) -> ChannelResult<()> {
        base::apply_body_redirect(req, group, CHANNEL_NAME)
    }

    fn transform_model_list(
        &self,
        _req: &OutboundRequest,
        body: &[u8],
        group: &ChannelGroup,
    ) -> Bytes {
        base::transform_data_model_list(body, group)
    }

    async fn validate_key(
        &self,
        credential: &Credential,
        group: &ChannelGroup,
    ) -> ChannelResult<()> {
        let upstream = select_upstream(group)?;
        let path = group
            .validation_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .unwrap_or(DEFAULT_VALIDATION_PATH);
        let model = group
            .test_model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(DEFAULT_TEST_MODEL);

        // max_tokens is required by the Messages API.
        let payload = json!({
            "model": model,
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 1,
        });
        let body =
            serde_json::to_vec(&payload).map_err(|err| ChannelError::Other(err.to_string()))?;

        let mut headers: Headers = Vec::new();
        set_auth_headers(&mut headers, credential);
        header_set(&mut headers, "Content-Type", "application/json");

        debug!(
            channel = CHANNEL_NAME,
            group = %group.name,
            credential = %credential.masked(),
            "sending validation probe"
        );
        probe::run_probe(
            CHANNEL_NAME,
            ProbeRequest {
                url: probe::join_probe_url(&upstream.url, path),
                headers,
                body: Bytes::from(body),
            },
        )
        .await
    }
}
