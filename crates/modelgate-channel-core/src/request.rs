use bytes::Bytes;
use url::Url;

use crate::errors::{ChannelError, ChannelResult};
use crate::headers::Headers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn parse(method: &str) -> Option<Self> {
        if method.eq_ignore_ascii_case("GET") {
            Some(HttpMethod::Get)
        } else if method.eq_ignore_ascii_case("POST") {
            Some(HttpMethod::Post)
        } else if method.eq_ignore_ascii_case("PUT") {
            Some(HttpMethod::Put)
        } else if method.eq_ignore_ascii_case("PATCH") {
            Some(HttpMethod::Patch)
        } else if method.eq_ignore_ascii_case("DELETE") {
            Some(HttpMethod::Delete)
        } else {
            None
        }
    }
}

/// Outbound request under construction.
///
/// Scheme and host are fixed by the chosen upstream; path, query, headers and
/// body stay mutable so a channel can rewrite them in place. The upstream's
/// own base path (for example `/v1beta` or a full Vertex resource prefix) is
/// folded into `path` at construction time.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    upstream: Url,
    pub path: String,
    pub query: Option<String>,
    pub headers: Headers,
    pub body: Bytes,
}

impl OutboundRequest {
    /// Builds a request against the chosen upstream. `path_and_query` is the
    /// inbound request path (with the proxy prefix already stripped), joined
    /// onto the upstream's base path. Query carries over from the inbound
    /// side only.
    pub fn new(
        method: HttpMethod,
        upstream_url: &str,
        path_and_query: &str,
        headers: Headers,
        body: Bytes,
    ) -> ChannelResult<Self> {
        let upstream = Url::parse(upstream_url.trim()).map_err(|err| {
            ChannelError::InvalidGroup(format!("invalid upstream url {upstream_url:?}: {err}"))
        })?;
        if !upstream.has_host() {
            return Err(ChannelError::InvalidGroup(format!(
                "upstream url {upstream_url:?} has no host"
            )));
        }

        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) if !query.is_empty() => (path, Some(query.to_string())),
            Some((path, _)) => (path, None),
            None => (path_and_query, None),
        };

        let base = upstream.path().trim_end_matches('/');
        let mut joined = String::with_capacity(base.len() + path.len() + 1);
        joined.push_str(base);
        if !path.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(path);
        if joined.is_empty() {
            joined.push('/');
        }

        Ok(Self {
            method,
            upstream,
            path: joined,
            query,
            headers,
            body,
        })
    }

    /// The chosen upstream base URL (scheme, host, port, base path).
    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// Full URL for the forwarding layer.
    pub fn url(&self) -> String {
        let mut url = self.upstream.clone();
        url.set_path(&self.path);
        url.set_query(self.query.as_deref().filter(|q| !q.is_empty()));
        url.to_string()
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Sets (or replaces) a single query parameter, keeping the others.
    pub fn set_query_param(&mut self, name: &str, value: &str) {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        if let Some(query) = self.query.as_deref() {
            for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
                if k != name {
                    serializer.append_pair(&k, &v);
                }
            }
        }
        serializer.append_pair(name, value);
        self.query = Some(serializer.finish());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(upstream: &str, path: &str) -> OutboundRequest {
        OutboundRequest::new(HttpMethod::Post, upstream, path, Vec::new(), Bytes::new()).unwrap()
    }

    #[test]
    fn joins_upstream_base_path() {
        let req = request("https://api.example.com", "/v1/chat/completions");
        assert_eq!(req.path, "/v1/chat/completions");

        let req = request("https://api.example.com/v1beta/", "/models/gemini-pro:generateContent");
        assert_eq!(req.path, "/v1beta/models/gemini-pro:generateContent");
        assert_eq!(
            req.url(),
            "https://api.example.com/v1beta/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn splits_inbound_query() {
        let req = request("https://api.example.com", "/v1beta/models?pageSize=5&pageToken=abc");
        assert_eq!(req.path, "/v1beta/models");
        assert_eq!(req.query_param("pageToken"), Some("abc".to_string()));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn set_query_param_replaces_existing() {
        let mut req = request("https://api.example.com", "/v1beta/models/m:generateContent?key=old&alt=sse");
        req.set_query_param("key", "new");
        assert_eq!(req.query_param("key"), Some("new".to_string()));
        assert_eq!(req.query_param("alt"), Some("sse".to_string()));

        let mut req = request("https://api.example.com", "/v1beta/models/m:generateContent");
        req.set_query_param("key", "k1");
        assert_eq!(req.query.as_deref(), Some("key=k1"));
    }

    #[test]
    fn url_keeps_method_suffix_unencoded() {
        let req = request("https://host.example", "/v1/models/gemini-pro:streamGenerateContent");
        assert_eq!(
            req.url(),
            "https://host.example/v1/models/gemini-pro:streamGenerateContent"
        );
    }

    #[test]
    fn rejects_unparseable_upstream() {
        let err = OutboundRequest::new(HttpMethod::Get, "not a url", "/x", Vec::new(), Bytes::new())
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidGroup(_)));
    }
}
