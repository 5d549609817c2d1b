use crate::domain::stream::Quality;
use serde::{Deserialize, Serialize};

/// One viewer-triggered transcode request, queued per target quality.
/// Ephemeral: lives only between enqueue and the worker consuming it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    /// Unique job ID
    pub id: String,
    pub user_id: String,
    /// Secret key of the source stream, resolved at admission time
    pub stream_key: String,
    /// Public output key the encoder will publish under, e.g. `public-u1`
    pub public_key: String,
    pub quality: Quality,
}

impl TranscodeJob {
    /// Key the spawned encoder is registered and deduplicated under.
    pub fn output_key(&self) -> String {
        format!("{}_{}", self.public_key, self.quality)
    }

    /// Relay URL the encoder publishes its output to. Publishing there
    /// fires the `userId-public_quality` derived-publish webhook and makes
    /// the relay serve the rendition's playlist.
    pub fn publish_url(&self, rtmp_base: &str) -> String {
        format!("{}/{}-public_{}", rtmp_base, self.user_id, self.quality)
    }
}
