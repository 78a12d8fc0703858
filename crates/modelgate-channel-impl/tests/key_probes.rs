use std::sync::Arc;

use mockito::Matcher;
use serde_json::json;

use modelgate_channel_core::{
    ChannelError, ChannelGroup, ChannelProxy, ChannelRegistry, Credential, Upstream,
};
use modelgate_channel_impl::register_builtin_channels;

fn channel_for(group: &ChannelGroup) -> Arc<dyn ChannelProxy> {
    let mut registry = ChannelRegistry::new();
    register_builtin_channels(&mut registry);
    registry.build(group).unwrap()
}

fn group(channel_type: &str, upstream_url: &str) -> ChannelGroup {
    ChannelGroup::new("probe-group", channel_type, vec![Upstream::new(upstream_url)])
}

#[tokio::test]
async fn openai_probe_hits_default_endpoint_with_bearer_auth() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 1,
        })))
        .with_status(200)
        .with_body(r#"{"id":"chatcmpl-1","object":"chat.completion"}"#)
        .create_async()
        .await;

    let group = group("openai", &server.url());
    let channel = channel_for(&group);
    channel
        .validate_key(&Credential::new(1, "sk-test"), &group)
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn openai_probe_surfaces_upstream_rejection() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#)
        .create_async()
        .await;

    let group = group("openai", &server.url());
    let channel = channel_for(&group);
    let err = channel
        .validate_key(&Credential::new(1, "sk-bad"), &group)
        .await
        .unwrap_err();
    match err {
        ChannelError::Upstream { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn openai_probe_honors_endpoint_and_model_overrides() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/compat/chat")
        .match_body(Matcher::PartialJson(json!({"model": "my-tuned-model"})))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let mut group = group("openai", &server.url());
    group.validation_endpoint = Some("/compat/chat".to_string());
    group.test_model = Some("my-tuned-model".to_string());
    let channel = channel_for(&group);
    channel
        .validate_key(&Credential::new(1, "sk-test"), &group)
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn anthropic_probe_sends_api_key_and_version_headers() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "ak-test")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(json!({
            "model": "claude-3-5-haiku-latest",
            "max_tokens": 1,
        })))
        .with_status(200)
        .with_body(r#"{"id":"msg_1","type":"message"}"#)
        .create_async()
        .await;

    let group = group("anthropic", &server.url());
    let channel = channel_for(&group);
    channel
        .validate_key(&Credential::new(1, "ak-test"), &group)
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn gemini_probe_authenticates_via_key_query_param() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
        .match_query(Matcher::UrlEncoded("key".to_string(), "g-key".to_string()))
        .match_body(Matcher::PartialJson(json!({
            "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
        })))
        .with_status(200)
        .with_body(r#"{"candidates":[]}"#)
        .create_async()
        .await;

    let group = group("gemini", &server.url());
    let channel = channel_for(&group);
    channel
        .validate_key(&Credential::new(1, "g-key"), &group)
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn gemini_probe_uses_configured_test_model() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1beta/models/gemini-2.5-pro:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let mut group = group("gemini", &server.url());
    group.test_model = Some("gemini-2.5-pro".to_string());
    let channel = channel_for(&group);
    channel
        .validate_key(&Credential::new(1, "g-key"), &group)
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn unreachable_upstream_reports_transport_error() {
    // Nothing listens on this port.
    let group = group("openai", "http://127.0.0.1:9");
    let channel = channel_for(&group);
    let err = channel
        .validate_key(&Credential::new(1, "sk-test"), &group)
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::Transport(_)));
}
