//! Permalink patterns.
//!
//! A pattern such as `/:year/:month/:slug/` (or `/{year}/{month}/{slug}/`)
//! is parsed once and expanded per resource. Expansion only reads the
//! resource and the site timezone, so the same inputs always give the
//! same URL.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{UrlPath, url_join};
use crate::resource::Resource;

/// Placeholder in a permalink pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Slug,
    Id,
    Uuid,
    Year,
    Month,
    Day,
    PrimaryTag,
    PrimaryAuthor,
}

impl Token {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "slug" => Self::Slug,
            "id" => Self::Id,
            "uuid" => Self::Uuid,
            "year" => Self::Year,
            "month" => Self::Month,
            "day" => Self::Day,
            "primary_tag" => Self::PrimaryTag,
            "primary_author" => Self::PrimaryAuthor,
            _ => return None,
        })
    }

    const fn is_date(self) -> bool {
        matches!(self, Self::Year | Self::Month | Self::Day)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Token(Token),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermalinkError {
    #[error("permalink must not be empty")]
    Empty,

    #[error("unknown permalink token `{token}` in `{pattern}`")]
    UnknownToken { pattern: String, token: String },
}

/// Parsed permalink pattern
#[derive(Debug, Clone)]
pub struct PermalinkPattern {
    source: String,
    parts: Vec<Part>,
}

/// Fallback for missing primary tag or author.
const MISSING_RELATION: &str = "all";

static RE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([a-z_]+)|\{([a-z_]+)\}").unwrap());

impl PermalinkPattern {
    pub fn parse(pattern: &str) -> Result<Self, PermalinkError> {
        let source = pattern.trim();
        if source.is_empty() {
            return Err(PermalinkError::Empty);
        }

        let mut parts = Vec::new();
        let mut last = 0;
        for caps in RE_TOKEN.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            let token = Token::parse(name).ok_or_else(|| PermalinkError::UnknownToken {
                pattern: source.to_string(),
                token: name.to_string(),
            })?;

            if whole.start() > last {
                parts.push(Part::Literal(source[last..whole.start()].to_string()));
            }
            parts.push(Part::Token(token));
            last = whole.end();
        }
        if last < source.len() {
            parts.push(Part::Literal(source[last..].to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern depends on the publication date.
    pub fn has_date_token(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::Token(t) if t.is_date()))
    }

    /// Expand for a resource in the given timezone.
    pub fn expand(&self, resource: &Resource, tz: Tz) -> UrlPath {
        let date = resource
            .date()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            .with_timezone(&tz);

        let mut out = String::with_capacity(self.source.len() + 16);
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Token(token) => match token {
                    Token::Slug => out.push_str(resource.slug().unwrap_or(resource.id.as_str())),
                    Token::Id => out.push_str(resource.id.as_str()),
                    Token::Uuid => out.push_str(
                        resource
                            .attr_str("uuid")
                            .unwrap_or(resource.id.as_str()),
                    ),
                    Token::Year => out.push_str(&date.format("%Y").to_string()),
                    Token::Month => out.push_str(&date.format("%m").to_string()),
                    Token::Day => out.push_str(&date.format("%d").to_string()),
                    Token::PrimaryTag => out.push_str(
                        resource
                            .primary_slug("tags")
                            .unwrap_or(MISSING_RELATION),
                    ),
                    Token::PrimaryAuthor => out.push_str(
                        resource
                            .primary_slug("authors")
                            .unwrap_or(MISSING_RELATION),
                    ),
                },
            }
        }

        UrlPath::from_page(&out)
    }

    /// Pattern with the optional `edit` suffix appended.
    pub fn with_url_options(&self) -> String {
        url_join(&[&self.source, "/:options(edit)?/"])
    }
}

impl PartialEq for PermalinkPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for PermalinkPattern {}

impl fmt::Display for PermalinkPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for PermalinkPattern {
    type Err = PermalinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PermalinkPattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.source.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PermalinkPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
