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

pub(crate) const CHANNEL_NAME: &str = "gemini";
const DEFAULT_TEST_MODEL: &str = "gemini-2.0-flash";
const STREAM_SUFFIX: &str = ":streamGenerateContent";
/// Requests under this sub-path speak the OpenAI-compatible dialect: bearer
/// auth and a body-located model instead of the native key/path conventions.
const OPENAI_COMPAT_MARKER: &str = "/openai/";

#[derive(Debug, Default)]
pub struct GeminiChannel;

impl GeminiChannel {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn build(group: &ChannelGroup) -> ChannelResult<Arc<dyn ChannelProxy>> {
    require_upstreams(group)?;
    Ok(Arc::new(GeminiChannel::new()))
}

#[async_trait::async_trait]
impl ChannelProxy for GeminiChannel {
    fn name(&self) -> &'static str {
        CHANNEL_NAME
    }

    async fn modify_request(
        &self,
        req: &mut OutboundRequest,
        credential: &Credential,
        _group: &ChannelGroup,
    ) -> ChannelResult<()> {
        if req.path.contains(OPENAI_COMPAT_MARKER) {
            header_set(
                &mut req.headers,
                "Authorization",
                format!("Bearer {}", credential.secret),
            );
        } else {
            req.set_query_param("key", &credential.secret);
        }
        Ok(())
    }

    fn is_stream_request(&self, req: &OutboundRequest) -> bool {
        base::is_stream_request(req, &[STREAM_SUFFIX])
    }

    fn extract_model(&self, req: &OutboundRequest) -> Option<String> {
        base::extract_model(req)
    }

    fn apply_model_redirect(
        &self,
        req: &mut OutboundRequest,
        group: &ChannelGroup,
    ) -> ChannelResult<()> {
        if group.model_redirects.is_empty() {
            return Ok(());
        }
        if req.path.contains(OPENAI_COMPAT_MARKER) {
            return base::apply_body_redirect(req, group, CHANNEL_NAME);
        }
        base::apply_path_redirect(req, group, CHANNEL_NAME)
    }

    fn transform_model_list(
        &self,
        req: &OutboundRequest,
        body: &[u8],
        group: &ChannelGroup,
    ) -> Bytes {
        base::transform_gemini_model_list(req, body, group)
    }

    async fn validate_key(
        &self,
        credential: &Credential,
        group: &ChannelGroup,
    ) -> ChannelResult<()> {
        let upstream = select_upstream(group)?;
        let model = group
            .test_model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(DEFAULT_TEST_MODEL);

        let url = format!(
            "{}?key={}",
            probe::join_probe_url(
                &upstream.url,
                &format!("/v1beta/models/{model}:generateContent"),
            ),
            urlencoding::encode(&credential.secret),
        );

        let payload = json!({
            "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
        });
        let body =
            serde_json::to_vec(&payload).map_err(|err| ChannelError::Other(err.to_string()))?;

        let mut headers: Headers = Vec::new();
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
                url,
                headers,
                body: Bytes::from(body),
            },
        )
        .await
    }
}
