//! Broker URI parsing.
//!
//! Two forms are understood:
//!
//! - simple: `scheme://host[:port][?key=value[&key=value...]]`
//! - composite: `scheme://(uri1,uri2,...)[?key=value...]` (the `//` is optional,
//!   so `failover:(tcp://a:61616)` works too)
//!
//! Query parameters are kept as ordered string pairs; interpreting them is
//! left to the transport factories.

use crate::error::Error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A parsed broker URI.
///
/// Equality and hashing use the original text, so two URIs are the same pool
/// entry exactly when they were written the same way.
#[derive(Debug, Clone)]
pub struct BrokerUri {
    text: String,
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    parameters: Vec<(String, String)>,
    components: Vec<BrokerUri>,
}

impl BrokerUri {
    /// Parses a broker URI.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.trim();
        let invalid = |reason: &str| Error::InvalidUri {
            uri: text.to_string(),
            reason: reason.to_string(),
        };

        let colon = text.find(':').ok_or_else(|| invalid("missing scheme"))?;
        let scheme = &text[..colon];
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(invalid("malformed scheme"));
        }
        let rest = &text[colon + 1..];
        let rest = rest.strip_prefix("//").unwrap_or(rest);

        if let Some(inner) = rest.strip_prefix('(') {
            let close = matching_paren(inner).ok_or_else(|| invalid("unbalanced parentheses"))?;
            let components = split_top_level(&inner[..close])
                .into_iter()
                .filter(|part| !part.trim().is_empty())
                .map(BrokerUri::parse)
                .collect::<Result<Vec<_>, _>>()?;
            if components.is_empty() {
                return Err(invalid("composite URI has no members"));
            }
            let tail = &inner[close + 1..];
            let parameters = match tail.strip_prefix('?') {
                Some(query) => parse_query(query),
                None if tail.is_empty() => Vec::new(),
                None => return Err(invalid("unexpected text after composite list")),
            };
            return Ok(Self {
                text: text.to_string(),
                scheme: scheme.to_string(),
                host: None,
                port: None,
                parameters,
                components,
            });
        }

        let (authority, query) = match rest.split_once('?') {
            Some((authority, query)) => (authority, Some(query)),
            None => (rest, None),
        };
        let authority = authority.trim_end_matches('/');
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
                (host, Some(port))
            }
            None => (authority, None),
        };
        if host.is_empty() && port.is_some() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            text: text.to_string(),
            scheme: scheme.to_string(),
            host: (!host.is_empty()).then(|| host.to_string()),
            port,
            parameters: query.map(parse_query).unwrap_or_default(),
            components: Vec::new(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Query parameters in the order they were written.
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// Returns the last value given for `key`.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Member URIs of a composite URI; empty for simple URIs.
    pub fn components(&self) -> &[BrokerUri] {
        &self.components
    }

    pub fn is_composite(&self) -> bool {
        !self.components.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for BrokerUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BrokerUri::parse(s)
    }
}

impl fmt::Display for BrokerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for BrokerUri {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for BrokerUri {}

impl Hash for BrokerUri {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

// Index of the ')' closing the list that starts right before `s`.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return Some(i),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (percent_decode(key), percent_decode(value)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
