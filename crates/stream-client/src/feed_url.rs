//! Feed URL construction.
//!
//! `<ws|wss>://<host><endpoint>?<params>&token=<token>`; the scheme follows
//! the console page's own protocol unless overridden.

use url::Url;

use vaultdeck_protocol::constants::WS_TOKEN_PARAM;

use crate::types::Params;

/// Scheme and host that feed sockets connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// `wss` when true, `ws` otherwise.
    pub secure: bool,
    /// Host, with port if non-default.
    pub host: String,
}

impl Origin {
    pub fn new(secure: bool, host: impl Into<String>) -> Self {
        Self {
            secure,
            host: host.into(),
        }
    }

    /// Derives the feed origin from the console page URL: `https` pages use
    /// `wss`, anything else `ws`, and the page's host is reused.
    pub fn from_page(page: &Url) -> Option<Self> {
        let host = page.host_str()?;
        let host = match page.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Some(Self {
            secure: page.scheme() == "https",
            host,
        })
    }

    fn scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }
}

/// Builds the URL for one connect attempt.
///
/// Empty parameter values are omitted; a caller-supplied `token` parameter
/// is ignored in favour of the credential store's.
pub fn build_feed_url(
    origin: &Origin,
    endpoint: &str,
    params: &Params,
    token: &str,
) -> Result<Url, url::ParseError> {
    let path = if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{endpoint}")
    };
    let mut url = Url::parse(&format!("{}://{}{}", origin.scheme(), origin.host, path))?;
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            if value.is_empty() || key == WS_TOKEN_PARAM {
                continue;
            }
            query.append_pair(key, value);
        }
        if !token.is_empty() {
            query.append_pair(WS_TOKEN_PARAM, token);
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url)
}
