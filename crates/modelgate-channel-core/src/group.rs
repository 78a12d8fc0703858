use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_weight() -> u32 {
    1
}

/// One upstream base URL with a selection weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl Upstream {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            weight: default_weight(),
        }
    }

    pub fn weighted(url: impl Into<String>, weight: u32) -> Self {
        Self {
            url: url.into(),
            weight,
        }
    }
}

/// Resolved routing-group configuration, owned by the external configuration
/// store and immutable for the duration of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGroup {
    pub name: String,
    /// Registry key selecting the channel implementation.
    pub channel_type: String,
    pub upstreams: Vec<Upstream>,
    /// Source model name -> target model name. Applied at most once per
    /// request; keys are unique by construction.
    #[serde(default)]
    pub model_redirects: HashMap<String, String>,
    /// Reject any model not present in `model_redirects`.
    #[serde(default)]
    pub redirect_strict: bool,
    /// Custom health-probe path, where the channel supports one.
    #[serde(default)]
    pub validation_endpoint: Option<String>,
    /// Model name substituted into health-probe payloads.
    #[serde(default)]
    pub test_model: Option<String>,
}

impl ChannelGroup {
    pub fn new(
        name: impl Into<String>,
        channel_type: impl Into<String>,
        upstreams: Vec<Upstream>,
    ) -> Self {
        Self {
            name: name.into(),
            channel_type: channel_type.into(),
            upstreams,
            model_redirects: HashMap::new(),
            redirect_strict: false,
            validation_endpoint: None,
            test_model: None,
        }
    }
}
