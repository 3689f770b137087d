//! Request information for rate limiting.

use std::{borrow::Cow, net::IpAddr};

/// Caller key used when a request carries no address at all.
pub const ANONYMOUS: &str = "anonymous";

/// Information about a request that needs to be rate limited.
#[derive(Debug, Clone, Default)]
pub struct RateLimitRequest {
    /// Raw value of the `X-Forwarded-For` header.
    pub forwarded_for: Option<String>,
    /// Address of the directly connected peer.
    pub peer: Option<IpAddr>,
    /// Route template of the operation being invoked.
    pub operation: Option<String>,
}

impl RateLimitRequest {
    /// Create a new builder for a rate limit request.
    pub fn builder() -> RateLimitRequestBuilder {
        RateLimitRequestBuilder::default()
    }

    /// The key that identifies the caller: the first forwarded address, else the peer
    /// address, else `anonymous`.
    pub fn caller_key(&self) -> Cow<'_, str> {
        let forwarded = self
            .forwarded_for
            .as_deref()
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty());

        match (forwarded, self.peer) {
            (Some(first), _) => Cow::Borrowed(first),
            (None, Some(peer)) => Cow::Owned(peer.to_string()),
            (None, None) => Cow::Borrowed(ANONYMOUS),
        }
    }
}

/// Builder for creating rate limit requests.
#[derive(Debug, Default)]
pub struct RateLimitRequestBuilder {
    forwarded_for: Option<String>,
    peer: Option<IpAddr>,
    operation: Option<String>,
}

impl RateLimitRequestBuilder {
    /// Set the `X-Forwarded-For` header value.
    pub fn forwarded_for(mut self, header: impl Into<String>) -> Self {
        self.forwarded_for = Some(header.into());
        self
    }

    /// Set the peer address.
    pub fn peer(mut self, ip: IpAddr) -> Self {
        self.peer = Some(ip);
        self
    }

    /// Set the peer address from a string.
    pub fn peer_str(mut self, ip: &str) -> Result<Self, std::net::AddrParseError> {
        self.peer = Some(ip.parse()?);
        Ok(self)
    }

    /// Set the operation name.
    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.operation = Some(name.into());
        self
    }

    /// Build the rate limit request.
    pub fn build(self) -> RateLimitRequest {
        RateLimitRequest {
            forwarded_for: self.forwarded_for,
            peer: self.peer,
            operation: self.operation,
        }
    }
}
