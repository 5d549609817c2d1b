//! Parsing of the string-encoded identifiers that arrive at the boundary.
//!
//! The relay hands us publish names shaped `userId-secretOrOutputKey` for
//! the main ingest and `userId-outputKey_quality` for an encoder announcing
//! one rendition. Viewers request playlists shaped
//! `/hls/public-<userId>_<quality>.m3u8`. Both are parsed exactly once into
//! structured form; nothing downstream re-splits the strings.

use crate::domain::stream::Quality;
use regex::Regex;
use std::error::Error;
use std::fmt;

/// A publish lifecycle notification target, decoded from `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishName {
    pub user_id: String,
    /// The secret stream key (main publish) or the public output key prefix
    /// (derived publish).
    pub key: String,
    /// `None` for the main ingest, the target quality for a derived publish.
    pub quality: Option<Quality>,
}

impl PublishName {
    pub fn parse(name: &str) -> Result<PublishName, ParseError> {
        let (user_id, rest) = name
            .split_once('-')
            .ok_or_else(|| ParseError::Malformed(name.to_string()))?;
        if user_id.is_empty() || rest.is_empty() {
            return Err(ParseError::Malformed(name.to_string()));
        }

        match rest.split_once('_') {
            Some((key, quality)) => {
                let quality = quality
                    .parse::<Quality>()
                    .map_err(|_| ParseError::UnknownQuality(quality.to_string()))?;
                Ok(PublishName {
                    user_id: user_id.to_string(),
                    key: key.to_string(),
                    quality: Some(quality),
                })
            }
            None => Ok(PublishName {
                user_id: user_id.to_string(),
                key: rest.to_string(),
                quality: None,
            }),
        }
    }

    pub fn is_main(&self) -> bool {
        self.quality.is_none()
    }
}

/// A viewer-requested rendition, decoded from the playlist URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerTarget {
    pub user_id: String,
    /// `public-<userId>`, the key the encoder publishes its output under.
    pub public_key: String,
    pub quality: Quality,
}

impl ViewerTarget {
    pub fn parse(uri: &str) -> Result<ViewerTarget, ParseError> {
        let re = Regex::new(r"^/hls/public-([^_/]+)_([^./]+)\.m3u8$").unwrap();
        let caps = re
            .captures(uri)
            .ok_or_else(|| ParseError::Malformed(uri.to_string()))?;
        let user_id = caps.get(1).unwrap().as_str().to_string();
        let quality_str = caps.get(2).unwrap().as_str();
        let quality = quality_str
            .parse::<Quality>()
            .map_err(|_| ParseError::UnknownQuality(quality_str.to_string()))?;
        Ok(ViewerTarget {
            public_key: format!("public-{}", user_id),
            user_id,
            quality,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    Malformed(String),
    UnknownQuality(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Malformed(s) => write!(f, "malformed identifier: {}", s),
            ParseError::UnknownQuality(q) => write!(f, "unknown quality: {}", q),
        }
    }
}

impl Error for ParseError {}
