use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::json;
use tracing::debug;
use url::Url;

use modelgate_channel_core::{
    ChannelError, ChannelGroup, ChannelProxy, ChannelResult, Credential, CredentialId, Headers,
    OutboundRequest, ServiceAccount, header_set,
};

use crate::base;
use crate::probe::{self, ProbeRequest};
use crate::upstream::{require_upstreams, select_upstream};

mod oauth;

pub(crate) const CHANNEL_NAME: &str = "vertex_gemini";
const DEFAULT_TEST_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const STREAM_SUFFIX: &str = ":streamGenerateContent";
const OPENAI_COMPAT_MARKER: &str = "/openai/";
const GEMINI_MODELS_PREFIX_V1BETA: &str = "/v1beta/models";
const GEMINI_MODELS_PREFIX_V1: &str = "/v1/models";
/// A cached token this close to expiry counts as already expired, covering
/// clock skew and in-flight request latency.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 120;

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    /// Unix seconds.
    expires_at: i64,
}

/// Vertex-hosted Gemini. Credentials are GCP service accounts; each request
/// carries a short-lived bearer token minted via the JWT-bearer OAuth2 grant
/// and cached per stored credential.
#[derive(Debug, Default)]
pub struct VertexGeminiChannel {
    token_cache: Mutex<HashMap<CredentialId, AccessToken>>,
}

impl VertexGeminiChannel {
    pub fn new() -> Self {
        Self::default()
    }

    async fn access_token(
        &self,
        credential: &Credential,
        account: &ServiceAccount,
    ) -> ChannelResult<String> {
        let now = base::unix_now();
        {
            let guard = self
                .token_cache
                .lock()
                .map_err(|_| ChannelError::Other("token cache lock failed".to_string()))?;
            if let Some(cached) = guard.get(&credential.id)
                && !cached.token.is_empty()
                && cached.expires_at - now > TOKEN_EXPIRY_MARGIN_SECS
            {
                return Ok(cached.token.clone());
            }
        }

        // Concurrent misses for the same credential mint independently; the
        // last writer wins and every caller still holds a valid token.
        let minted = oauth::mint_access_token(account).await?;
        let token = minted.token.clone();
        let mut guard = self
            .token_cache
            .lock()
            .map_err(|_| ChannelError::Other("token cache lock failed".to_string()))?;
        guard.insert(credential.id, minted);
        Ok(token)
    }
}

pub(crate) fn build(group: &ChannelGroup) -> ChannelResult<Arc<dyn ChannelProxy>> {
    require_upstreams(group)?;
    Ok(Arc::new(VertexGeminiChannel::new()))
}

#[async_trait::async_trait]
impl ChannelProxy for VertexGeminiChannel {
    fn name(&self) -> &'static str {
        CHANNEL_NAME
    }

    async fn modify_request(
        &self,
        req: &mut OutboundRequest,
        credential: &Credential,
        _group: &ChannelGroup,
    ) -> ChannelResult<()> {
        let account = ServiceAccount::parse(&credential.secret)?;

        // Compatibility rewrite: accept Gemini native paths while calling the
        // Vertex upstream.
        rewrite_gemini_path_to_vertex(req, &account);

        let token = self.access_token(credential, &account).await?;
        header_set(&mut req.headers, "Authorization", format!("Bearer {token}"));
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
        let upstream_url = Url::parse(upstream.url.trim()).map_err(|err| {
            ChannelError::InvalidGroup(format!("invalid upstream url {:?}: {err}", upstream.url))
        })?;
        let account = ServiceAccount::parse(&credential.secret)?;

        // The probe URL cannot even be constructed without a project and a
        // location; failing to infer them is a local error, not an upstream
        // rejection.
        let project_id = extract_vertex_project_id(upstream_url.path())
            .or_else(|| {
                let from_account = account.project_id.trim();
                (!from_account.is_empty()).then(|| from_account.to_string())
            })
            .ok_or(ChannelError::ProjectInference)?;
        let location = extract_vertex_location(upstream_url.path(), &upstream_url)
            .ok_or(ChannelError::LocationInference)?;

        let token = self.access_token(credential, &account).await?;
        let model = group
            .test_model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(DEFAULT_TEST_MODEL);
        let url = build_vertex_model_method_url(
            &upstream_url,
            &project_id,
            &location,
            model,
            "generateContent",
        )?;

        let payload = json!({
            "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
        });
        let body =
            serde_json::to_vec(&payload).map_err(|err| ChannelError::Other(err.to_string()))?;

        let mut headers: Headers = Vec::new();
        header_set(&mut headers, "Authorization", format!("Bearer {token}"));
        header_set(&mut headers, "Content-Type", "application/json");

        debug!(
            channel = CHANNEL_NAME,
            group = %group.name,
            credential = %credential.masked(),
            url = %url,
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

/// Rewrites a Gemini-native models path (`/v1beta/models/...` or
/// `/v1/models/...`) into the Vertex resource grammar, preserving the model
/// name, method suffix and everything after the matched prefix. When the
/// required coordinates cannot be inferred the path is forwarded untouched
/// and the upstream reports the failure.
fn rewrite_gemini_path_to_vertex(req: &mut OutboundRequest, account: &ServiceAccount) {
    let path = req.path.clone();
    let (idx, matched) = match path.find(GEMINI_MODELS_PREFIX_V1BETA) {
        Some(idx) => (idx, GEMINI_MODELS_PREFIX_V1BETA),
        None => match path.find(GEMINI_MODELS_PREFIX_V1) {
            Some(idx) => (idx, GEMINI_MODELS_PREFIX_V1),
            None => return,
        },
    };

    let prefix_before = &path[..idx];
    let suffix_after = &path[idx + matched.len()..];
    let Some(replacement) =
        vertex_models_replacement(prefix_before, &path, req.upstream(), account)
    else {
        return;
    };
    req.path = format!("{prefix_before}{replacement}{suffix_after}");
}

/// What the matched Gemini prefix becomes, depending on how much of the
/// Vertex resource grammar the upstream base path already provides.
fn vertex_models_replacement(
    prefix_before: &str,
    full_path: &str,
    upstream: &Url,
    account: &ServiceAccount,
) -> Option<String> {
    if prefix_before.contains("/publishers/google/models") {
        // Already at ".../publishers/google/models", just drop the Gemini prefix.
        return Some(String::new());
    }
    if prefix_before.contains("/publishers/google") {
        if prefix_before.trim_end_matches('/').ends_with("/models") {
            return Some(String::new());
        }
        return Some("/models".to_string());
    }
    if prefix_before.contains("/projects/") && prefix_before.contains("/locations/") {
        return Some("/publishers/google/models".to_string());
    }

    // Synthesize a full Vertex models prefix under whatever base path the
    // upstream carries.
    let project_id = account.project_id.trim();
    if project_id.is_empty() {
        return None;
    }
    let location = extract_vertex_location(full_path, upstream)?;
    Some(format!(
        "/v1/projects/{project_id}/locations/{location}/publishers/google/models"
    ))
}

/// Location from a `/locations/{location}/` path segment, else from the
/// hostname convention `{location}-aiplatform.googleapis.com` (the bare host
/// is `global`).
fn extract_vertex_location(path: &str, upstream: &Url) -> Option<String> {
    let segments: Vec<&str> = path.split('/').collect();
    for (idx, segment) in segments.iter().enumerate() {
        if *segment == "locations" && idx + 1 < segments.len() && !segments[idx + 1].is_empty() {
            return Some(segments[idx + 1].to_string());
        }
    }

    let host = upstream.host_str()?;
    if host == "aiplatform.googleapis.com" {
        return Some("global".to_string());
    }
    let location = host.strip_suffix("-aiplatform.googleapis.com")?;
    if location.is_empty() {
        return None;
    }
    Some(location.to_string())
}

fn extract_vertex_project_id(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').collect();
    for (idx, segment) in segments.iter().enumerate() {
        if *segment == "projects" && idx + 1 < segments.len() && !segments[idx + 1].is_empty() {
            return Some(segments[idx + 1].to_string());
        }
    }
    None
}

/// Probe URL in the Vertex resource grammar, keeping any reverse-proxy base
/// path the upstream carries while avoiding a doubled `/v1/projects/` prefix.
fn build_vertex_model_method_url(
    upstream: &Url,
    project_id: &str,
    location: &str,
    model: &str,
    method: &str,
) -> ChannelResult<String> {
    if project_id.is_empty() || location.is_empty() || model.is_empty() || method.is_empty() {
        return Err(ChannelError::InvalidGroup(
            "missing required vertex url parts".to_string(),
        ));
    }

    let vertex_path = format!(
        "/v1/projects/{project_id}/locations/{location}/publishers/google/models/{model}:{method}"
    );

    let mut base_path = upstream.path().trim_end_matches('/').to_string();
    if let Some(idx) = base_path.find("/v1/projects/") {
        base_path.truncate(idx);
    }
    let base_path = base_path.trim_end_matches('/');

    let mut url = upstream.clone();
    url.set_path(&format!("{base_path}{vertex_path}"));
    url.set_query(None);
    Ok(url.to_string())
}
