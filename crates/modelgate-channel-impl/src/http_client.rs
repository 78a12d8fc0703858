use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use modelgate_channel_core::{ChannelError, ChannelResult};

/// A hung token endpoint must not stall a request indefinitely when the
/// caller brought no deadline of its own.
const TOKEN_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SharedClientKind {
    Probe,
    TokenExchange,
}

static CLIENT_CACHE: OnceLock<Mutex<HashMap<SharedClientKind, wreq::Client>>> = OnceLock::new();

pub(crate) fn shared_client(kind: SharedClientKind) -> ChannelResult<wreq::Client> {
    let cache = CLIENT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache
        .lock()
        .map_err(|_| ChannelError::Other("http client cache lock failed".to_string()))?;

    if let Some(client) = guard.get(&kind) {
        return Ok(client.clone());
    }

    let client = build_client(kind)?;
    guard.insert(kind, client.clone());
    Ok(client)
}

fn build_client(kind: SharedClientKind) -> ChannelResult<wreq::Client> {
    let timeout = match kind {
        SharedClientKind::Probe => PROBE_TIMEOUT,
        SharedClientKind::TokenExchange => TOKEN_EXCHANGE_TIMEOUT,
    };
    wreq::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .map_err(|err| ChannelError::Other(err.to_string()))
}
