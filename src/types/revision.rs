// ABOUTME: Semantic-version release tag parsing and ordering.
// ABOUTME: Handles formats like 1.2.3, v1.2.3, v1.2.3-rc.1+build.5.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRevisionError {
    #[error("revision tag cannot be empty")]
    Empty,

    #[error("invalid character in revision tag: {0}")]
    InvalidChar(char),

    #[error("revision tag must be MAJOR.MINOR.PATCH: {0}")]
    InvalidFormat(String),

    #[error("invalid numeric component '{0}' in revision tag")]
    InvalidNumber(String),
}

/// An immutable, tagged deployable unit.
///
/// The original tag text is kept verbatim so it can be handed back to git;
/// ordering follows the parsed version, with a pre-release sorting before the
/// plain release it precedes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision {
    tag: String,
    major: u64,
    minor: u64,
    patch: u64,
    pre: Option<String>,
    build: Option<String>,
}

impl Revision {
    pub fn parse(input: &str) -> Result<Self, ParseRevisionError> {
        let tag = input.trim();
        if tag.is_empty() {
            return Err(ParseRevisionError::Empty);
        }

        for c in tag.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '+') {
                return Err(ParseRevisionError::InvalidChar(c));
            }
        }

        let version = tag
            .strip_prefix('v')
            .or_else(|| tag.strip_prefix('V'))
            .unwrap_or(tag);

        let (without_build, build) = match version.split_once('+') {
            Some((before, after)) => (before, Some(after.to_string())),
            None => (version, None),
        };

        let (core, pre) = match without_build.split_once('-') {
            Some((before, after)) => (before, Some(after.to_string())),
            None => (without_build, None),
        };

        if pre.as_deref() == Some("") || build.as_deref() == Some("") {
            return Err(ParseRevisionError::InvalidFormat(tag.to_string()));
        }

        let parts: Vec<&str> = core.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(ParseRevisionError::InvalidFormat(tag.to_string()));
        };

        Ok(Self {
            tag: tag.to_string(),
            major: parse_number(major)?,
            minor: parse_number(minor)?,
            patch: parse_number(patch)?,
            pre,
            build,
        })
    }

    /// The tag exactly as published.
    pub fn as_tag(&self) -> &str {
        &self.tag
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn pre_release(&self) -> Option<&str> {
        self.pre.as_deref()
    }

    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }
}

fn parse_number(part: &str) -> Result<u64, ParseRevisionError> {
    if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseRevisionError::InvalidNumber(part.to_string()));
    }
    part.parse()
        .map_err(|_| ParseRevisionError::InvalidNumber(part.to_string()))
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
            // Keeps Ord consistent with Eq for tags like "1.0.0" vs "v1.0.0"
            .then_with(|| self.tag.cmp(&other.tag))
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)
    }
}

impl std::str::FromStr for Revision {
    type Err = ParseRevisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Revision::parse(s)
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.tag.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Revision::parse(&s).map_err(serde::de::Error::custom)
    }
}
