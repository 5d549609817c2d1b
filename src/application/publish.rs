//! Publish gate: validates publish-start/stop notifications from the relay
//! and drives the stream/quality state machine.
//!
//! The gate answers the relay synchronously; kicking off the encoder ladder
//! after a main publish happens in a detached task because the relay cannot
//! be kept waiting on encoder warm-up, and a failed kick-off must never
//! change the already-sent acknowledgment.

use crate::domain::publish::PublishName;
use crate::domain::stream::{Quality, SourceInfo};
use crate::ports::repository::StreamRepository;
use crate::ports::transcoder::Transcoder;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug)]
pub enum PublishError {
    /// Validation failure: unknown user, wrong key, bad name, bad state.
    /// Maps to 403, no state was mutated.
    Rejected(String),
    /// Store failure while reading or persisting.
    Internal(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Rejected(reason) => write!(f, "rejected: {}", reason),
            PublishError::Internal(e) => write!(f, "internal error: {}", e),
        }
    }
}

impl Error for PublishError {}

#[derive(Clone)]
pub struct PublishService {
    repo: Arc<dyn StreamRepository>,
    transcoder: Arc<dyn Transcoder>,
}

impl PublishService {
    pub fn new(repo: Arc<dyn StreamRepository>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self { repo, transcoder }
    }

    /// Handle a publish-start notification. Ok means the relay may accept
    /// the incoming stream.
    pub async fn publish_start(&self, name: &str) -> Result<(), PublishError> {
        let parsed = PublishName::parse(name)
            .map_err(|e| PublishError::Rejected(e.to_string()))?;
        let mut stream = self
            .repo
            .find_by_user_id(&parsed.user_id)
            .await
            .map_err(PublishError::Internal)?
            .ok_or_else(|| PublishError::Rejected(format!("user not found: {}", parsed.user_id)))?;

        match parsed.quality {
            None => {
                stream
                    .begin_main_publish(&parsed.key)
                    .map_err(|e| PublishError::Rejected(e.to_string()))?;
                self.repo
                    .save(&stream)
                    .await
                    .map_err(PublishError::Internal)?;
                debug!("stream started: {}", name);

                // The main signal already succeeded; a failed encoder
                // kick-off leaves the stream live.
                let transcoder = self.transcoder.clone();
                let user_id = parsed.user_id.clone();
                let source = name.to_string();
                tokio::spawn(async move {
                    if let Err(e) = transcoder.start(&user_id, &source).await {
                        error!("failed to start restream for {}: {}", user_id, e);
                    }
                });
                Ok(())
            }
            Some(quality) => {
                stream
                    .begin_derived_publish(quality)
                    .map_err(|e| PublishError::Rejected(e.to_string()))?;
                self.repo
                    .save(&stream)
                    .await
                    .map_err(PublishError::Internal)?;
                debug!("rendition live: {} @ {}", parsed.user_id, quality);
                Ok(())
            }
        }
    }

    /// Handle a publish-stop notification.
    pub async fn publish_stop(&self, name: &str) -> Result<(), PublishError> {
        let parsed = PublishName::parse(name)
            .map_err(|e| PublishError::Rejected(e.to_string()))?;
        let mut stream = self
            .repo
            .find_by_user_id(&parsed.user_id)
            .await
            .map_err(PublishError::Internal)?
            .ok_or_else(|| PublishError::Rejected(format!("user not found: {}", parsed.user_id)))?;

        match parsed.quality {
            None => {
                stream
                    .end_main_publish(&parsed.key)
                    .map_err(|e| PublishError::Rejected(e.to_string()))?;
                debug!("stream stopped: {}", name);
            }
            Some(quality) => {
                stream
                    .end_derived_publish(quality)
                    .map_err(|e| PublishError::Rejected(e.to_string()))?;
                debug!("rendition offline: {} @ {}", parsed.user_id, quality);
            }
        }
        self.repo.save(&stream).await.map_err(PublishError::Internal)
    }

    /// Best-effort metadata push from the encoder tier.
    pub async fn set_source_info(
        &self,
        user_id: &str,
        info: SourceInfo,
        started: &[Quality],
    ) -> Result<(), PublishError> {
        let mut stream = self
            .repo
            .find_by_user_id(user_id)
            .await
            .map_err(PublishError::Internal)?
            .ok_or_else(|| PublishError::Rejected(format!("user not found: {}", user_id)))?;
        stream.apply_source_info(info, started);
        self.repo.save(&stream).await.map_err(PublishError::Internal)
    }

    /// Resolve a user's secret stream key (service-internal lookup).
    pub async fn stream_key(&self, user_id: &str) -> Result<Option<String>, PublishError> {
        let stream = self
            .repo
            .find_by_user_id(user_id)
            .await
            .map_err(PublishError::Internal)?;
        Ok(stream.map(|s| s.stream_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stream::{RenditionStatus, Stream};
    use crate::ports::repository::MockStreamRepository;
    use crate::ports::transcoder::MockTranscoder;
    use std::time::Duration;

    fn offline_stream() -> Stream {
        Stream::new("u1", "secretA")
    }

    fn live_stream() -> Stream {
        let mut stream = offline_stream();
        stream.begin_main_publish("secretA").unwrap();
        stream
    }

    fn repo_returning(stream: Option<Stream>) -> MockStreamRepository {
        let mut repo = MockStreamRepository::new();
        repo.expect_find_by_user_id()
            .returning(move |_| Ok(stream.clone()));
        repo
    }

    #[tokio::test]
    async fn main_publish_accepted_saves_live_record_and_kicks_encoder() {
        let mut repo = repo_returning(Some(offline_stream()));
        repo.expect_save()
            .times(1)
            .withf(|s: &Stream| s.is_live && s.qualities.len() == 7)
            .returning(|_| Ok(()));

        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_start()
            .times(1)
            .withf(|user_id, source| user_id == "u1" && source == "u1-secretA")
            .returning(|_, _| Ok(()));

        let svc = PublishService::new(Arc::new(repo), Arc::new(transcoder));
        svc.publish_start("u1-secretA").await.unwrap();

        // encoder start is detached from the acknowledgment
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn wrong_key_rejected_without_mutation() {
        let mut repo = repo_returning(Some(offline_stream()));
        repo.expect_save().times(0);
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_start().times(0);

        let svc = PublishService::new(Arc::new(repo), Arc::new(transcoder));
        let err = svc.publish_start("u1-wrongkey").await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected(_)));
    }

    #[tokio::test]
    async fn unknown_user_rejected() {
        let repo = repo_returning(None);
        let svc = PublishService::new(Arc::new(repo), Arc::new(MockTranscoder::new()));
        assert!(matches!(
            svc.publish_start("ghost-key").await,
            Err(PublishError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn second_main_publish_rejected_while_live() {
        let mut repo = repo_returning(Some(live_stream()));
        repo.expect_save().times(0);
        let svc = PublishService::new(Arc::new(repo), Arc::new(MockTranscoder::new()));
        assert!(matches!(
            svc.publish_start("u1-secretA").await,
            Err(PublishError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn derived_publish_marks_rendition_live() {
        let mut stream = live_stream();
        stream.apply_source_info(
            SourceInfo {
                width: 1280,
                height: 720,
                display_aspect_ratio: "16:9".into(),
            },
            &[Quality::P720],
        );
        let mut repo = repo_returning(Some(stream));
        repo.expect_save()
            .times(1)
            .withf(|s: &Stream| {
                s.rendition(Quality::P720).unwrap().status == RenditionStatus::Live
            })
            .returning(|_| Ok(()));
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_start().times(0);

        let svc = PublishService::new(Arc::new(repo), Arc::new(transcoder));
        svc.publish_start("u1-public_720p").await.unwrap();
    }

    #[tokio::test]
    async fn derived_publish_rejected_when_already_live() {
        let mut stream = live_stream();
        stream.begin_derived_publish(Quality::P720).unwrap();
        let mut repo = repo_returning(Some(stream));
        repo.expect_save().times(0);

        let svc = PublishService::new(Arc::new(repo), Arc::new(MockTranscoder::new()));
        assert!(matches!(
            svc.publish_start("u1-public_720p").await,
            Err(PublishError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn stop_resets_record() {
        let mut stream = live_stream();
        stream.begin_derived_publish(Quality::P360).unwrap();
        let mut repo = repo_returning(Some(stream));
        repo.expect_save()
            .times(1)
            .withf(|s: &Stream| {
                !s.is_live
                    && s.qualities
                        .iter()
                        .all(|r| r.status == RenditionStatus::Offline)
            })
            .returning(|_| Ok(()));

        let svc = PublishService::new(Arc::new(repo), Arc::new(MockTranscoder::new()));
        svc.publish_stop("u1-secretA").await.unwrap();
    }

    #[tokio::test]
    async fn set_source_info_marks_prepare() {
        let mut repo = repo_returning(Some(live_stream()));
        repo.expect_save()
            .times(1)
            .withf(|s: &Stream| {
                s.rendition(Quality::P480).unwrap().status == RenditionStatus::Prepare
                    && s.source.is_some()
            })
            .returning(|_| Ok(()));

        let svc = PublishService::new(Arc::new(repo), Arc::new(MockTranscoder::new()));
        svc.set_source_info(
            "u1",
            SourceInfo {
                width: 854,
                height: 480,
                display_aspect_ratio: "16:9".into(),
            },
            &[Quality::P480],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn stream_key_lookup() {
        let svc = PublishService::new(
            Arc::new(repo_returning(Some(offline_stream()))),
            Arc::new(MockTranscoder::new()),
        );
        assert_eq!(svc.stream_key("u1").await.unwrap().unwrap(), "secretA");
    }
}
