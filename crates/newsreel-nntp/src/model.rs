use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Parsed NNTP status line.
///
/// Response codes are defined in [RFC 3977 §3.2](https://datatracker.ietf.org/doc/html/rfc3977#section-3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NntpResponse {
    pub code: u16,
    pub message: String,
}

/// Status line followed by a dot-terminated block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultilineResponse {
    pub code: u16,
    pub message: String,
    pub lines: Vec<String>,
}

/// Which status codes a command accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Exactly this code.
    Code(u16),
    /// Any code whose first digit is this one, e.g. `Class(2)` is 200..=299.
    Class(u8),
    /// No validation; the caller inspects the code.
    Any,
}

impl Expect {
    pub fn accepts(self, code: u16) -> bool {
        match self {
            Expect::Code(want) => code == want,
            Expect::Class(digit) => code / 100 == u16::from(digit),
            Expect::Any => true,
        }
    }
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Code(code) => write!(f, "{code}"),
            Expect::Class(digit) => write!(f, "{digit}xx"),
            Expect::Any => f.write_str("any"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingStatus {
    Permitted,
    Moderated,
    NotPermitted,
}

impl PostingStatus {
    /// Decode the flag column of a LIST ACTIVE line.
    pub fn from_flag(flag: &str) -> Self {
        match flag {
            "y" => PostingStatus::Permitted,
            "m" => PostingStatus::Moderated,
            _ => PostingStatus::NotPermitted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    /// Estimated article count. LIST does not report one and leaves it at 0.
    pub count: i64,
    pub low: i64,
    pub high: i64,
    pub posting: PostingStatus,
}

/// Overview fields keyed by header name, compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: HashMap<String, (String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value stored under the same name.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(
            name.to_ascii_lowercase(),
            (name.to_string(), value.into()),
        );
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs using the names as first inserted.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in iter {
            map.set(name, value);
        }
        map
    }
}

/// One XOVER/XZVER line decoded against the negotiated overview format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overview {
    pub headers: HeaderMap,
}

impl Overview {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Article number from the leading column, if it parses.
    pub fn number(&self) -> Option<i64> {
        self.headers.get("Article")?.trim().parse().ok()
    }
}
