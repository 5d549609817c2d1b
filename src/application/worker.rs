//! Rendition workers for the on-demand path.
//!
//! One worker task per ladder quality, each suspending on a blocking
//! dequeue of its own queue. The spawned encoder publishes its output back
//! to the relay under the public output key, so the relay's derived-publish
//! webhook moves the rendition to `live` and serves the playlist. A job
//! that cannot be started (source never ready, upscale, duplicate) is
//! dropped; the next viewer request or publish re-attempts from scratch.

use crate::application::registry::ProcessRegistry;
use crate::application::transcode::{report_source_info, spawn_encoder};
use crate::domain::cmd;
use crate::domain::jobs::TranscodeJob;
use crate::domain::stream::Quality;
use crate::ports::probe::SourceProbe;
use crate::ports::queue::JobQueue;
use crate::ports::repository::StreamRepository;
use std::error::Error;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct RenditionWorker {
    queue: Arc<dyn JobQueue>,
    probe: Arc<dyn SourceProbe>,
    registry: Arc<ProcessRegistry>,
    repo: Arc<dyn StreamRepository>,
    rtmp_base: String,
    ffmpeg_bin: String,
}

impl RenditionWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        probe: Arc<dyn SourceProbe>,
        registry: Arc<ProcessRegistry>,
        repo: Arc<dyn StreamRepository>,
        rtmp_base: String,
        ffmpeg_bin: String,
    ) -> Self {
        Self {
            queue,
            probe,
            registry,
            repo,
            rtmp_base,
            ffmpeg_bin,
        }
    }

    /// Spawn one worker loop per transcoded quality.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        Quality::LADDER
            .iter()
            .map(|&quality| {
                let worker = self.clone();
                tokio::spawn(async move {
                    worker.run_loop(quality).await;
                })
            })
            .collect()
    }

    async fn run_loop(&self, quality: Quality) {
        info!("[worker {}] started", quality);
        loop {
            match self.queue.dequeue(quality, 0.0).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process_job(&job).await {
                        error!("[worker {}] job {} dropped: {}", quality, job.id, e);
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    error!("[worker {}] queue error: {}", quality, e);
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn process_job(&self, job: &TranscodeJob) -> Result<(), Box<dyn Error + Send + Sync>> {
        let output_key = job.output_key();
        if self.registry.contains(&output_key) {
            debug!("encoder already running for {}, discarding job", output_key);
            return Ok(());
        }

        let input_url = format!("{}/{}-{}", self.rtmp_base, job.user_id, job.stream_key);
        let info = self.probe.probe(&input_url).await?;

        let profile = cmd::profile_for(job.quality)
            .ok_or_else(|| format!("{} has no encode profile", job.quality))?;
        if profile.height > info.height {
            warn!(
                "skipping {}: rung {} exceeds source height {}",
                output_key, profile.height, info.height
            );
            return Ok(());
        }

        // the relay's derived-publish webhook takes the rendition to live
        let destination = job.publish_url(&self.rtmp_base);
        let args = cmd::single_args(&input_url, &destination, profile);
        debug!("ffmpeg {}", args.join(" "));

        let child = spawn_encoder(&self.ffmpeg_bin, &args, output_key.clone())?;
        self.registry.add(&output_key, child, vec![job.quality])?;
        info!("transcoding {} started from {}", output_key, input_url);

        // Best-effort: a failed report leaves the encoder running.
        if let Err(e) =
            report_source_info(self.repo.clone(), &job.user_id, info, &[job.quality]).await
        {
            error!("failed to report source info for {}: {}", job.user_id, e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stream::{RenditionStatus, SourceInfo, Stream};
    use crate::ports::probe::{MockSourceProbe, ProbeError};
    use crate::ports::queue::MockJobQueue;
    use crate::ports::repository::MockStreamRepository;

    fn job(quality: Quality) -> TranscodeJob {
        TranscodeJob {
            id: "j1".into(),
            user_id: "u1".into(),
            stream_key: "secretA".into(),
            public_key: "public-u1".into(),
            quality,
        }
    }

    fn worker(
        probe: MockSourceProbe,
        repo: MockStreamRepository,
        registry: Arc<ProcessRegistry>,
    ) -> RenditionWorker {
        RenditionWorker::new(
            Arc::new(MockJobQueue::new()),
            Arc::new(probe),
            registry,
            Arc::new(repo),
            "rtmp://relay/live".into(),
            "sleep".into(),
        )
    }

    fn live_repo() -> MockStreamRepository {
        let mut repo = MockStreamRepository::new();
        repo.expect_find_by_user_id().returning(|_| {
            let mut stream = Stream::new("u1", "secretA");
            stream.begin_main_publish("secretA").unwrap();
            Ok(Some(stream))
        });
        repo
    }

    #[tokio::test]
    async fn job_spawns_registers_and_reports_prepare() {
        let mut probe = MockSourceProbe::new();
        probe
            .expect_probe()
            .withf(|url| url == "rtmp://relay/live/u1-secretA")
            .returning(|_| {
                Ok(SourceInfo {
                    width: 1280,
                    height: 720,
                    display_aspect_ratio: "16:9".into(),
                })
            });
        let mut repo = live_repo();
        repo.expect_save()
            .times(1)
            .withf(|s: &Stream| {
                s.rendition(Quality::P480).unwrap().status == RenditionStatus::Prepare
            })
            .returning(|_| Ok(()));

        let registry = Arc::new(ProcessRegistry::new());
        let w = worker(probe, repo, registry.clone());
        w.process_job(&job(Quality::P480)).await.unwrap();

        assert!(registry.contains("public-u1_480p"));
        registry.remove("public-u1_480p");
    }

    #[tokio::test]
    async fn duplicate_job_is_discarded() {
        let registry = Arc::new(ProcessRegistry::new());
        registry
            .add(
                "public-u1_480p",
                tokio::process::Command::new("sleep").arg("30").spawn().unwrap(),
                vec![Quality::P480],
            )
            .unwrap();

        let mut probe = MockSourceProbe::new();
        probe.expect_probe().times(0);
        let w = worker(probe, MockStreamRepository::new(), registry.clone());
        w.process_job(&job(Quality::P480)).await.unwrap();
        assert_eq!(registry.len(), 1);
        registry.remove("public-u1_480p");
    }

    #[tokio::test]
    async fn exhausted_probe_drops_the_job() {
        let mut probe = MockSourceProbe::new();
        probe
            .expect_probe()
            .returning(|_| Err(ProbeError::NeverReady { attempts: 10 }));
        let registry = Arc::new(ProcessRegistry::new());
        let w = worker(probe, MockStreamRepository::new(), registry.clone());

        assert!(w.process_job(&job(Quality::P480)).await.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn upscale_request_is_skipped() {
        let mut probe = MockSourceProbe::new();
        probe.expect_probe().returning(|_| {
            Ok(SourceInfo {
                width: 640,
                height: 360,
                display_aspect_ratio: "16:9".into(),
            })
        });
        let registry = Arc::new(ProcessRegistry::new());
        let w = worker(probe, MockStreamRepository::new(), registry.clone());

        w.process_job(&job(Quality::P1080)).await.unwrap();
        assert!(registry.is_empty());
    }
}
