//! Endpoint addressing and fallback rules
//!
//! Deployed lab servers differ in where they mount the command endpoints
//! and whether they speak TLS. The client starts from the configured
//! address and adapts one request at a time according to a
//! [`FallbackPolicy`].

use std::ops::RangeInclusive;

use crate::error::{ClientError, Result};

/// URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Https,
    Http,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Https => write!(f, "https"),
            Scheme::Http => write!(f, "http"),
        }
    }
}

/// Where command requests are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    /// Host, optional port and optional base path, without slashes at the ends
    authority: String,
    /// Path segment inserted between the base and the command
    prefix: Option<String>,
}

impl Endpoint {
    /// Parses a server address
    ///
    /// The address may carry an `http://` or `https://` scheme, in any case;
    /// a bare host starts on `https`.
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        let (scheme, rest) = match address.split_once("://") {
            Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
                "https" => (Scheme::Https, rest),
                "http" => (Scheme::Http, rest),
                _ => return Err(ClientError::InvalidAddress(address.to_string())),
            },
            None => (Scheme::Https, address),
        };

        let authority = rest.trim_matches('/');
        if authority.is_empty() || authority.contains(char::is_whitespace) {
            return Err(ClientError::InvalidAddress(address.to_string()));
        }

        Ok(Self {
            scheme,
            authority: authority.to_string(),
            prefix: None,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Full URL for `command` (e.g. `pushcmd`, `download`)
    pub fn url(&self, command: &str) -> String {
        let command = command.trim_start_matches('/');
        match &self.prefix {
            Some(prefix) => format!("{}://{}/{}/{}", self.scheme, self.authority, prefix, command),
            None => format!("{}://{}/{}", self.scheme, self.authority, command),
        }
    }

    fn with_prefix(&self, prefix: &str) -> Self {
        Self {
            prefix: Some(prefix.trim_matches('/').to_string()),
            ..self.clone()
        }
    }

    fn downgraded(&self) -> Self {
        Self {
            scheme: Scheme::Http,
            ..self.clone()
        }
    }
}

/// Rules for adapting a failed request to older or plain-HTTP servers
///
/// Each rule fires at most once per request: once applied, its trigger
/// condition no longer holds for the adapted endpoint.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    /// Prefix to insert after a 404 (servers that moved their API under `/rest`)
    pub alternate_prefix: Option<String>,
    /// Retry on plain HTTP after a 405 on HTTPS
    pub downgrade_on_405: bool,
    /// Retry on plain HTTP when the HTTPS connection cannot be established
    pub downgrade_on_connect_failure: bool,
    /// Status codes the caller should simply poll again on
    pub retryable_status: RangeInclusive<u16>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            alternate_prefix: Some("rest".to_string()),
            downgrade_on_405: true,
            downgrade_on_connect_failure: true,
            retryable_status: 500..=510,
        }
    }
}

impl FallbackPolicy {
    /// Endpoint to retry on after an unsuccessful HTTP status, if any
    pub fn on_status(&self, endpoint: &Endpoint, status: u16) -> Option<Endpoint> {
        match status {
            404 => match &self.alternate_prefix {
                Some(prefix) if endpoint.prefix.is_none() => Some(endpoint.with_prefix(prefix)),
                _ => None,
            },
            405 if self.downgrade_on_405 && endpoint.scheme == Scheme::Https => {
                Some(endpoint.downgraded())
            }
            _ => None,
        }
    }

    /// Endpoint to retry on after the connection could not be established
    pub fn on_connect_failure(&self, endpoint: &Endpoint) -> Option<Endpoint> {
        if self.downgrade_on_connect_failure && endpoint.scheme == Scheme::Https {
            Some(endpoint.downgraded())
        } else {
            None
        }
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status.contains(&status)
    }
}
