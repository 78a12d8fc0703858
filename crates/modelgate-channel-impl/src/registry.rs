use modelgate_channel_core::ChannelRegistry;

use crate::channels::{anthropic, gemini, openai, vertex_gemini};

/// Installs the built-in channel constructors. Call once at startup, before
/// the registry is shared.
pub fn register_builtin_channels(registry: &mut ChannelRegistry) {
    registry.register(openai::CHANNEL_NAME, openai::build);
    registry.register(anthropic::CHANNEL_NAME, anthropic::build);
    registry.register(gemini::CHANNEL_NAME, gemini::build);
    registry.register(vertex_gemini::CHANNEL_NAME, vertex_gemini::build);
}
