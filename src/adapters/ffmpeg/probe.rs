//! ffprobe-backed source probe.
//!
//! A live source only becomes probeable some time after the publish
//! handshake, so the probe polls `ffprobe -show_streams` until the source
//! exposes both a video and an audio elementary stream, within a bounded
//! retry budget. Budget exhaustion is a hard failure for the caller's job.

use crate::domain::stream::SourceInfo;
use crate::ports::probe::{ProbeError, SourceProbe};
use async_trait::async_trait;
use serde::Deserialize;
use std::io;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tracing::debug;

/// Runs the stream-introspection command once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    async fn show_streams(&self, input_url: &str) -> io::Result<Output>;
}

pub struct RealProbeRunner {
    pub ffprobe_bin: String,
}

#[async_trait]
impl ProbeRunner for RealProbeRunner {
    async fn show_streams(&self, input_url: &str) -> io::Result<Output> {
        TokioCommand::new(&self.ffprobe_bin)
            .arg("-v")
            .arg("error")
            .arg("-analyzeduration")
            .arg("10000000")
            .arg("-probesize")
            .arg("10000000")
            .arg("-show_streams")
            .arg("-of")
            .arg("json")
            .arg(input_url)
            .output()
            .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    /// Retry budget; the probe terminates after exactly this many attempts.
    pub attempts: u32,
    /// Spacing between attempts.
    pub delay: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    display_aspect_ratio: Option<String>,
}

pub struct FfprobeSource<R = RealProbeRunner> {
    runner: R,
    config: ProbeConfig,
}

impl<R: ProbeRunner> FfprobeSource<R> {
    pub fn new(runner: R, config: ProbeConfig) -> Self {
        Self { runner, config }
    }

    async fn try_once(
        &self,
        input_url: &str,
    ) -> Result<SourceInfo, Box<dyn std::error::Error + Send + Sync>> {
        let output = self.runner.show_streams(input_url).await?;
        if !output.status.success() {
            return Err(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )
            .into());
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let has_audio = parsed
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"));
        let video = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));

        match (video, has_audio) {
            (Some(video), true) => Ok(SourceInfo {
                width: video.width.ok_or("video stream has no width")?,
                height: video.height.ok_or("video stream has no height")?,
                display_aspect_ratio: video
                    .display_aspect_ratio
                    .clone()
                    .unwrap_or_else(|| String::from("N/A")),
            }),
            _ => Err("no video or audio stream found".into()),
        }
    }
}

#[async_trait]
impl<R: ProbeRunner> SourceProbe for FfprobeSource<R> {
    async fn probe(&self, input_url: &str) -> Result<SourceInfo, ProbeError> {
        for attempt in 1..=self.config.attempts {
            match self.try_once(input_url).await {
                Ok(info) => {
                    debug!("stream ready at {} (attempt {})", input_url, attempt);
                    return Ok(info);
                }
                Err(e) => {
                    debug!(
                        "stream not ready at {} (attempt {}): {}",
                        input_url, attempt, e
                    );
                }
            }
            if attempt < self.config.attempts {
                tokio::time::sleep(self.config.delay).await;
            }
        }
        Err(ProbeError::NeverReady {
            attempts: self.config.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn ok_output(stdout: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    const READY: &str = r#"{"streams":[
        {"codec_type":"video","width":1280,"height":720,"display_aspect_ratio":"16:9"},
        {"codec_type":"audio"}
    ]}"#;
    const VIDEO_ONLY: &str = r#"{"streams":[
        {"codec_type":"video","width":1280,"height":720,"display_aspect_ratio":"16:9"}
    ]}"#;

    fn fast(attempts: u32) -> ProbeConfig {
        ProbeConfig {
            attempts,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn ready_source_yields_negotiated_metadata() {
        let mut runner = MockProbeRunner::new();
        runner
            .expect_show_streams()
            .times(1)
            .returning(|_| Ok(ok_output(READY)));

        let probe = FfprobeSource::new(runner, fast(10));
        let info = probe.probe("rtmp://relay/live/u1-k").await.unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert_eq!(info.display_aspect_ratio, "16:9");
    }

    #[tokio::test]
    async fn missing_audio_counts_as_not_ready() {
        let mut runner = MockProbeRunner::new();
        let mut call = 0;
        runner.expect_show_streams().times(2).returning(move |_| {
            call += 1;
            if call == 1 {
                Ok(ok_output(VIDEO_ONLY))
            } else {
                Ok(ok_output(READY))
            }
        });

        let probe = FfprobeSource::new(runner, fast(10));
        assert!(probe.probe("rtmp://relay/live/u1-k").await.is_ok());
    }

    #[tokio::test]
    async fn retry_budget_is_exact() {
        let mut runner = MockProbeRunner::new();
        runner
            .expect_show_streams()
            .times(3)
            .returning(|_| Err(io::Error::new(io::ErrorKind::Other, "connection refused")));

        let probe = FfprobeSource::new(runner, fast(3));
        let err = probe.probe("rtmp://relay/live/u1-k").await.unwrap_err();
        assert!(matches!(err, ProbeError::NeverReady { attempts: 3 }));
    }

    #[tokio::test]
    async fn nonzero_exit_counts_as_not_ready() {
        let mut runner = MockProbeRunner::new();
        runner.expect_show_streams().times(2).returning(|_| {
            Ok(Output {
                status: ExitStatus::from_raw(256),
                stdout: Vec::new(),
                stderr: b"Connection refused".to_vec(),
            })
        });

        let probe = FfprobeSource::new(runner, fast(2));
        assert!(probe.probe("rtmp://relay/live/u1-k").await.is_err());
    }
}
