//! Core channel abstractions for modelgate.
//!
//! This crate intentionally does **not** depend on any concrete HTTP client.
//! Channel implementations mutate an [`OutboundRequest`] in place; a higher
//! layer owns the sockets and performs the actual forwarding.

pub mod channel;
pub mod credential;
pub mod errors;
pub mod group;
pub mod headers;
pub mod registry;
pub mod request;

pub use channel::ChannelProxy;
pub use credential::{Credential, CredentialId, ServiceAccount};
pub use errors::{ChannelError, ChannelResult, parse_upstream_error, upstream_error_message};
pub use group::{ChannelGroup, Upstream};
pub use headers::{Headers, header_get, header_remove, header_set};
pub use registry::{ChannelBuilder, ChannelRegistry};
pub use request::{HttpMethod, OutboundRequest};
