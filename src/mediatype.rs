//! Media types and content negotiation.
//!
//! Content-Type and Accept headers are parsed with the grammar in
//! `mediatype.pest`. Types and parameter names are compared
//! case-insensitively; parameter values keep their case.

use std::fmt;
use std::str::FromStr;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use thiserror::Error;

#[derive(Parser)]
#[grammar = "mediatype.pest"]
struct MediaTypeParser;

#[derive(Error, Debug)]
pub enum MediaTypeError {
    #[error("Malformed media type '{input}': {message}")]
    Malformed { input: String, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaType {
    kind: String,
    subtype: String,
    params: Vec<(String, String)>,
}

impl MediaType {
    pub fn new(kind: &str, subtype: &str) -> Self {
        Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, MediaTypeError> {
        let mut pairs = MediaTypeParser::parse(Rule::content_type, input.trim())
            .map_err(|e| malformed(input, e))?;
        pairs
            .next()
            .and_then(|root| root.into_inner().find(|p| p.as_rule() == Rule::media_type))
            .map(from_pair)
            .ok_or_else(|| MediaTypeError::Malformed {
                input: input.to_string(),
                message: "empty".into(),
            })
    }

    /// Parses an Accept header into its media ranges, in header order.
    pub fn parse_accept(input: &str) -> Result<Vec<Self>, MediaTypeError> {
        let mut pairs =
            MediaTypeParser::parse(Rule::accept, input.trim()).map_err(|e| malformed(input, e))?;
        Ok(pairs
            .next()
            .map(|root| {
                root.into_inner()
                    .filter(|p| p.as_rule() == Rule::media_type)
                    .map(from_pair)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
    pub fn subtype(&self) -> &str {
        &self.subtype
    }
    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.kind, self.subtype)
    }
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }
    pub fn boundary(&self) -> Option<&str> {
        self.param("boundary")
    }
    pub fn quality(&self) -> f32 {
        self.param("q")
            .and_then(|q| q.parse::<f32>().ok())
            .map(|q| q.clamp(0.0, 1.0))
            .unwrap_or(1.0)
    }
    pub fn is_multipart(&self) -> bool {
        self.kind == "multipart"
    }

    /// Whether this (possibly wildcarded) range accepts `offer`.
    pub fn matches(&self, offer: &MediaType) -> bool {
        (self.kind == "*" || self.kind == offer.kind)
            && (self.subtype == "*" || self.subtype == offer.subtype)
    }
}

fn malformed(input: &str, e: pest::error::Error<Rule>) -> MediaTypeError {
    MediaTypeError::Malformed {
        input: input.to_string(),
        message: e.variant.message().to_string(),
    }
}

fn from_pair(pair: Pair<'_, Rule>) -> MediaType {
    let mut inner = pair.into_inner();
    let kind = inner.next().map(|p| p.as_str()).unwrap_or_default();
    let subtype = inner.next().map(|p| p.as_str()).unwrap_or_default();
    let mut media_type = MediaType::new(kind, subtype);
    for param in inner.filter(|p| p.as_rule() == Rule::param) {
        let mut kv = param.into_inner();
        let key = kv.next().map(|p| p.as_str().to_ascii_lowercase());
        let value = kv.next().map(|p| match p.as_rule() {
            Rule::quoted => p.as_str().trim_matches('"').to_string(),
            _ => p.as_str().to_string(),
        });
        if let (Some(key), Some(value)) = (key, value) {
            media_type.params.push((key, value));
        }
    }
    media_type
}

impl FromStr for MediaType {
    type Err = MediaTypeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)?;
        for (k, v) in &self.params {
            write!(f, "; {k}={v}")?;
        }
        Ok(())
    }
}

/// Picks the offer best matching the Accept header.
///
/// A missing or unparsable header accepts anything, so the first offer wins.
/// Ranges are tried by descending quality; ties keep header order. Returns
/// `None` when nothing offered is acceptable.
pub fn negotiate<'a>(accept: Option<&str>, offers: &[&'a str]) -> Option<&'a str> {
    let ranges = match accept.map(MediaType::parse_accept) {
        Some(Ok(ranges)) if !ranges.is_empty() => ranges,
        _ => return offers.first().copied(),
    };
    let parsed: Vec<(MediaType, &'a str)> = offers
        .iter()
        .filter_map(|o| MediaType::parse(o).ok().map(|m| (m, *o)))
        .collect();
    let mut ordered: Vec<&MediaType> = ranges.iter().filter(|r| r.quality() > 0.0).collect();
    ordered.sort_by(|a, b| {
        b.quality()
            .partial_cmp(&a.quality())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ordered.into_iter().find_map(|range| {
        parsed
            .iter()
            .find(|(offer, _)| range.matches(offer))
            .map(|(_, name)| *name)
    })
}
