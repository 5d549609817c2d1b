//! Stream and rendition records plus the publish/stop state machine.
//!
//! A `Stream` is the persisted record for one broadcaster: their secret
//! stream key, whether the main ingest is live, the probed source metadata
//! and the ordered ladder of quality renditions. All lifecycle transitions
//! check their preconditions right before mutating; persistence is
//! last-write-wins at the record level, so callers re-fetch before calling
//! any of the mutating methods.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// One output quality variant of a source stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "144p")]
    P144,
    #[serde(rename = "240p")]
    P240,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "source")]
    Source,
}

impl Quality {
    /// The six standard transcoded qualities, lowest first. Excludes the
    /// pass-through `source` entry.
    pub const LADDER: [Quality; 6] = [
        Quality::P144,
        Quality::P240,
        Quality::P360,
        Quality::P480,
        Quality::P720,
        Quality::P1080,
    ];
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quality::P144 => "144p",
            Quality::P240 => "240p",
            Quality::P360 => "360p",
            Quality::P480 => "480p",
            Quality::P720 => "720p",
            Quality::P1080 => "1080p",
            Quality::Source => "source",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Quality {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "144p" => Ok(Quality::P144),
            "240p" => Ok(Quality::P240),
            "360p" => Ok(Quality::P360),
            "480p" => Ok(Quality::P480),
            "720p" => Ok(Quality::P720),
            "1080p" => Ok(Quality::P1080),
            "source" => Ok(Quality::Source),
            other => Err(StreamError::UnknownQuality(other.to_string())),
        }
    }
}

/// Rendition lifecycle. `Offline -> Prepare -> Live` per attempt, back to
/// `Offline` on stop or failure. The lazy on-demand path may go
/// `Offline -> Live` directly when the encoder announces itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenditionStatus {
    Offline,
    Prepare,
    Live,
}

/// One entry in a stream's quality ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rendition {
    pub quality: Quality,
    pub is_source: bool,
    pub status: RenditionStatus,
}

/// Negotiated source metadata, populated once the source has been probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub display_aspect_ratio: String,
}

/// Persisted stream record, one per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub user_id: String,
    pub stream_key: String,
    pub is_live: bool,
    pub source: Option<SourceInfo>,
    pub qualities: Vec<Rendition>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum StreamError {
    InvalidKey,
    AlreadyLive,
    UnknownQuality(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::InvalidKey => write!(f, "invalid stream key"),
            StreamError::AlreadyLive => write!(f, "stream already live"),
            StreamError::UnknownQuality(q) => write!(f, "unknown quality: {}", q),
        }
    }
}

impl Error for StreamError {}

impl Stream {
    pub fn new(user_id: impl Into<String>, stream_key: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            stream_key: stream_key.into(),
            is_live: false,
            source: None,
            qualities: Vec::new(),
        }
    }

    pub fn rendition(&self, quality: Quality) -> Option<&Rendition> {
        self.qualities.iter().find(|r| r.quality == quality)
    }

    fn rendition_mut(&mut self, quality: Quality) -> Option<&mut Rendition> {
        self.qualities.iter_mut().find(|r| r.quality == quality)
    }

    /// Accept the main ingest. Rejects a wrong key or a re-publish while the
    /// previous session is still live, then rebuilds the quality ladder with
    /// every rendition offline.
    pub fn begin_main_publish(&mut self, key: &str) -> Result<(), StreamError> {
        if key != self.stream_key {
            return Err(StreamError::InvalidKey);
        }
        if self.is_live {
            return Err(StreamError::AlreadyLive);
        }
        self.is_live = true;
        self.reset_ladder();
        Ok(())
    }

    /// Accept an encoder announcing that quality `quality` has begun
    /// producing output.
    pub fn begin_derived_publish(&mut self, quality: Quality) -> Result<(), StreamError> {
        let rendition = self
            .rendition_mut(quality)
            .ok_or_else(|| StreamError::UnknownQuality(quality.to_string()))?;
        if rendition.status == RenditionStatus::Live {
            return Err(StreamError::AlreadyLive);
        }
        rendition.status = RenditionStatus::Live;
        Ok(())
    }

    /// Main ingest stopped: everything goes offline.
    pub fn end_main_publish(&mut self, key: &str) -> Result<(), StreamError> {
        if key != self.stream_key {
            return Err(StreamError::InvalidKey);
        }
        self.is_live = false;
        for rendition in &mut self.qualities {
            rendition.status = RenditionStatus::Offline;
        }
        Ok(())
    }

    pub fn end_derived_publish(&mut self, quality: Quality) -> Result<(), StreamError> {
        let rendition = self
            .rendition_mut(quality)
            .ok_or_else(|| StreamError::UnknownQuality(quality.to_string()))?;
        rendition.status = RenditionStatus::Offline;
        Ok(())
    }

    /// Record probed source metadata and move the started renditions to
    /// `prepare`. Renditions that already reached `live` are left alone.
    pub fn apply_source_info(&mut self, info: SourceInfo, started: &[Quality]) {
        self.source = Some(info);
        for &quality in started {
            if let Some(rendition) = self.rendition_mut(quality) {
                if rendition.status == RenditionStatus::Offline {
                    rendition.status = RenditionStatus::Prepare;
                }
            }
        }
    }

    fn reset_ladder(&mut self) {
        self.qualities.clear();
        for quality in Quality::LADDER {
            self.qualities.push(Rendition {
                quality,
                is_source: false,
                status: RenditionStatus::Offline,
            });
        }
        self.qualities.push(Rendition {
            quality: Quality::Source,
            is_source: true,
            status: RenditionStatus::Offline,
        });
    }
}
