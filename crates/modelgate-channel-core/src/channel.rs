use async_trait::async_trait;
use bytes::Bytes;

use crate::credential::Credential;
use crate::errors::ChannelResult;
use crate::group::ChannelGroup;
use crate::request::OutboundRequest;

/// Uniform per-vendor transformation contract.
///
/// The forwarding layer resolves a group, picks a credential, then drives one
/// request through `apply_model_redirect` -> `modify_request` ->
/// `is_stream_request` before sending. On a GET to a model-listing path it
/// additionally runs the upstream response through `transform_model_list`.
///
/// Implementations spawn no tasks of their own; the only methods that may
/// touch the network are `modify_request` (token minting) and `validate_key`
/// (the health probe), and both honor caller cancellation.
#[async_trait]
pub trait ChannelProxy: Send + Sync {
    /// Channel type tag, identical to the registry key the channel was
    /// registered under.
    fn name(&self) -> &'static str;

    /// Injects vendor auth into the request and performs any vendor-specific
    /// path rewriting. Called exactly once per outbound attempt.
    async fn modify_request(
        &self,
        req: &mut OutboundRequest,
        credential: &Credential,
        group: &ChannelGroup,
    ) -> ChannelResult<()>;

    /// Whether the response should be forwarded as a server-sent-event
    /// stream. Pure classification, no side effects.
    fn is_stream_request(&self, req: &OutboundRequest) -> bool;

    /// Locates the target model name in the request path or body.
    fn extract_model(&self, req: &OutboundRequest) -> Option<String>;

    /// Applies the group's model-redirect mapping in place, at most once.
    /// In strict mode a model absent from the mapping fails with
    /// [`ChannelError::ModelNotConfigured`](crate::ChannelError::ModelNotConfigured)
    /// and leaves the request untouched.
    fn apply_model_redirect(
        &self,
        req: &mut OutboundRequest,
        group: &ChannelGroup,
    ) -> ChannelResult<()>;

    /// Rewrites an upstream model-list response body and returns the bytes to
    /// forward. A body that cannot be parsed passes through unchanged; the
    /// parse failure is logged, never propagated.
    fn transform_model_list(
        &self,
        req: &OutboundRequest,
        body: &[u8],
        group: &ChannelGroup,
    ) -> Bytes;

    /// Sends a minimal synthetic request upstream to check that the
    /// credential is accepted. Any 2xx means valid; anything else carries the
    /// parsed upstream error.
    async fn validate_key(&self, credential: &Credential, group: &ChannelGroup)
    -> ChannelResult<()>;
}
