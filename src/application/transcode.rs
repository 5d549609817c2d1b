//! Eager transcode path: probe the source, build the multi-output ladder
//! invocation, spawn and register one ffmpeg process per user.

use crate::application::registry::ProcessRegistry;
use crate::domain::cmd;
use crate::domain::stream::{Quality, SourceInfo};
use crate::ports::probe::SourceProbe;
use crate::ports::repository::StreamRepository;
use crate::ports::transcoder::Transcoder;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug)]
pub enum TranscodeError {
    AlreadyRunning(String),
    SourceNotReady(String),
    Spawn(std::io::Error),
    NoApplicableQuality(u32),
}

impl fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscodeError::AlreadyRunning(key) => {
                write!(f, "encoder already running for: {}", key)
            }
            TranscodeError::SourceNotReady(url) => write!(f, "source not ready: {}", url),
            TranscodeError::Spawn(e) => write!(f, "failed to spawn encoder: {}", e),
            TranscodeError::NoApplicableQuality(h) => {
                write!(f, "no ladder rung fits source height {}", h)
            }
        }
    }
}

impl Error for TranscodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TranscodeError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

pub struct TranscodeService {
    registry: Arc<ProcessRegistry>,
    probe: Arc<dyn SourceProbe>,
    repo: Arc<dyn StreamRepository>,
    rtmp_base: String,
    hls_root: PathBuf,
    ffmpeg_bin: String,
}

impl TranscodeService {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        probe: Arc<dyn SourceProbe>,
        repo: Arc<dyn StreamRepository>,
        rtmp_base: String,
        hls_root: PathBuf,
        ffmpeg_bin: String,
    ) -> Self {
        Self {
            registry,
            probe,
            repo,
            rtmp_base,
            hls_root,
            ffmpeg_bin,
        }
    }
}

#[async_trait]
impl Transcoder for TranscodeService {
    async fn start(
        &self,
        user_id: &str,
        source: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.registry.contains(user_id) {
            return Err(Box::new(TranscodeError::AlreadyRunning(user_id.into())));
        }

        let input_url = format!("{}/{}", self.rtmp_base, source);
        let info = self.probe.probe(&input_url).await.map_err(|e| {
            error!("probe failed for {}: {}", input_url, e);
            TranscodeError::SourceNotReady(input_url.clone())
        })?;

        let profiles = cmd::applicable(info.height);
        if profiles.is_empty() {
            return Err(Box::new(TranscodeError::NoApplicableQuality(info.height)));
        }
        for profile in &profiles {
            trace!("source {}p fits rung {}", info.height, profile.quality);
            tokio::fs::create_dir_all(cmd::output_dir(&self.hls_root, user_id, profile.quality))
                .await?;
        }

        let args = cmd::ladder_args(&input_url, &self.hls_root, user_id, &profiles);
        debug!("ffmpeg {}", args.join(" "));

        let child = spawn_encoder(&self.ffmpeg_bin, &args, user_id.to_string())
            .map_err(TranscodeError::Spawn)?;
        let qualities: Vec<Quality> = profiles.iter().map(|p| p.quality).collect();
        self.registry.add(user_id, child, qualities.clone())?;
        info!("transcoding started from {}", input_url);

        // Report back after the response; failure is only observable in logs.
        let repo = self.repo.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = report_source_info(repo, &user_id, info, &qualities).await {
                error!("failed to set source info for {}: {}", user_id, e);
            }
        });

        Ok(())
    }

    async fn stop(&self, user_id: &str) -> Result<bool, Box<dyn Error + Send + Sync>> {
        Ok(self.registry.remove(user_id))
    }
}

/// Persist the negotiated source metadata and mark the started renditions as
/// preparing, so the record reflects what was actually spawned.
pub async fn report_source_info(
    repo: Arc<dyn StreamRepository>,
    user_id: &str,
    info: SourceInfo,
    started: &[Quality],
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut stream = repo
        .find_by_user_id(user_id)
        .await?
        .ok_or_else(|| format!("no stream record for {}", user_id))?;
    stream.apply_source_info(info, started);
    repo.save(&stream).await
}

/// Spawn an encoder with its stderr drained into trace logs. The process
/// writes segments itself; stdout is discarded.
pub(crate) fn spawn_encoder(
    ffmpeg_bin: &str,
    args: &[String],
    label: String,
) -> std::io::Result<Child> {
    let mut child = Command::new(ffmpeg_bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("[ffmpeg {}] {}", label, line);
            }
        });
    } else {
        warn!("no stderr handle for encoder {}", label);
    }

    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stream::Stream;
    use crate::ports::probe::{MockSourceProbe, ProbeError};
    use crate::ports::repository::MockStreamRepository;
    use std::time::Duration;
    use tempfile::tempdir;

    fn ready_probe(height: u32) -> MockSourceProbe {
        let mut probe = MockSourceProbe::new();
        probe.expect_probe().returning(move |_| {
            Ok(SourceInfo {
                width: height * 16 / 9,
                height,
                display_aspect_ratio: "16:9".into(),
            })
        });
        probe
    }

    fn service(
        probe: MockSourceProbe,
        repo: MockStreamRepository,
        registry: Arc<ProcessRegistry>,
        hls_root: PathBuf,
    ) -> TranscodeService {
        TranscodeService::new(
            registry,
            Arc::new(probe),
            Arc::new(repo),
            "rtmp://relay/live".into(),
            hls_root,
            // any argv-tolerant binary stands in for ffmpeg here
            "sleep".into(),
        )
    }

    #[tokio::test]
    async fn start_spawns_registers_and_reports() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(ProcessRegistry::new());

        let mut repo = MockStreamRepository::new();
        repo.expect_find_by_user_id()
            .returning(|_| Ok(Some(Stream::new("u1", "secretA"))));
        repo.expect_save()
            .times(1)
            .withf(|s: &Stream| s.source.as_ref().map(|i| i.height) == Some(720))
            .returning(|_| Ok(()));

        let svc = service(
            ready_probe(720),
            repo,
            registry.clone(),
            dir.path().to_path_buf(),
        );
        svc.start("u1", "u1-secretA").await.unwrap();

        assert!(registry.contains("u1"));
        assert_eq!(registry.get("u1").unwrap().renditions.len(), 5);
        assert!(dir.path().join("u1/720p").is_dir());

        // detached reporter runs after start returns
        tokio::time::sleep(Duration::from_millis(100)).await;
        registry.remove("u1");
    }

    #[tokio::test]
    async fn start_rejects_when_already_running() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(ProcessRegistry::new());
        registry
            .add(
                "u1",
                tokio::process::Command::new("sleep").arg("30").spawn().unwrap(),
                vec![],
            )
            .unwrap();

        let mut probe = MockSourceProbe::new();
        probe.expect_probe().times(0);
        let svc = service(
            probe,
            MockStreamRepository::new(),
            registry.clone(),
            dir.path().to_path_buf(),
        );

        let err = svc.start("u1", "u1-secretA").await.unwrap_err();
        assert!(err
            .downcast_ref::<TranscodeError>()
            .map(|e| matches!(e, TranscodeError::AlreadyRunning(_)))
            .unwrap_or(false));
        registry.remove("u1");
    }

    #[tokio::test]
    async fn start_fails_when_source_never_ready() {
        let dir = tempdir().unwrap();
        let mut probe = MockSourceProbe::new();
        probe
            .expect_probe()
            .returning(|_| Err(ProbeError::NeverReady { attempts: 10 }));
        let mut repo = MockStreamRepository::new();
        repo.expect_save().times(0);

        let registry = Arc::new(ProcessRegistry::new());
        let svc = service(probe, repo, registry.clone(), dir.path().to_path_buf());

        let err = svc.start("u1", "u1-secretA").await.unwrap_err();
        assert!(err
            .downcast_ref::<TranscodeError>()
            .map(|e| matches!(e, TranscodeError::SourceNotReady(_)))
            .unwrap_or(false));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn stop_reports_whether_anything_ran() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(ProcessRegistry::new());
        let svc = service(
            MockSourceProbe::new(),
            MockStreamRepository::new(),
            registry.clone(),
            dir.path().to_path_buf(),
        );

        assert!(!svc.stop("u1").await.unwrap());
        registry
            .add(
                "u1",
                tokio::process::Command::new("sleep").arg("30").spawn().unwrap(),
                vec![],
            )
            .unwrap();
        assert!(svc.stop("u1").await.unwrap());
    }
}
