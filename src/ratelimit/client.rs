//! Client key derivation.

use std::net::SocketAddr;

/// A key that identifies the origin of a request.
///
/// Keys compare by string equality only; the empty key is valid and
/// groups every request whose origin could not be determined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Wrap an arbitrary identifier.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive a key from an `X-Forwarded-For` header and the connection peer.
    ///
    /// The first non-empty hop of the header wins; otherwise the peer IP is
    /// used without its port, so reconnects from the same host share a quota.
    pub fn from_request_parts(forwarded_for: Option<&str>, peer: Option<SocketAddr>) -> Self {
        let forwarded = forwarded_for.and_then(|header| {
            header
                .split(',')
                .map(str::trim)
                .find(|hop| !hop.is_empty())
        });

        match (forwarded, peer) {
            (Some(hop), _) => Self::new(hop),
            (None, Some(addr)) => Self::new(addr.ip().to_string()),
            (None, None) => Self::default(),
        }
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ClientKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ClientKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
