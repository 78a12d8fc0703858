//! Built-in channel implementations.
//!
//! Each channel adapts one vendor API surface behind the
//! [`ChannelProxy`](modelgate_channel_core::ChannelProxy) contract: auth
//! injection, model extraction and redirect, streaming classification,
//! model-list rewriting and credential health probes. Network IO happens in
//! exactly two places, the Vertex token exchange and the health probes; all
//! other behavior is pure request surgery.

mod base;
mod channels;
mod http_client;
mod probe;
mod registry;
mod upstream;

pub use registry::register_builtin_channels;
pub use upstream::select_upstream;
