use std::collections::HashMap;
use std::sync::Arc;

use crate::channel::ChannelProxy;
use crate::errors::{ChannelError, ChannelResult};
use crate::group::ChannelGroup;

/// Constructs a channel instance for one resolved group. Builders validate
/// the group configuration up front so misconfiguration surfaces at startup,
/// not mid-request.
pub type ChannelBuilder = fn(&ChannelGroup) -> ChannelResult<Arc<dyn ChannelProxy>>;

/// Maps a channel-type string to its constructor.
///
/// Populated once at startup and read-only thereafter; lookups need no
/// synchronization.
#[derive(Default)]
pub struct ChannelRegistry {
    builders: HashMap<String, ChannelBuilder>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, channel_type: impl Into<String>, builder: ChannelBuilder) {
        self.builders.insert(channel_type.into(), builder);
    }

    pub fn contains(&self, channel_type: &str) -> bool {
        self.builders.contains_key(channel_type)
    }

    /// Builds the channel instance for `group.channel_type`.
    pub fn build(&self, group: &ChannelGroup) -> ChannelResult<Arc<dyn ChannelProxy>> {
        let builder = self.builders.get(group.channel_type.as_str()).ok_or_else(|| {
            ChannelError::InvalidGroup(format!("unknown channel type: {}", group.channel_type))
        })?;
        builder(group)
    }
}
