//! Configuration loaded from environment variables.

use std::env;

/// Configuration for the monolith deployment.
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Redis connection URL
    pub redis_url: String,
    /// RTMP application URL of the ingest relay, e.g. `rtmp://host:1935/live`
    pub rtmp_base: String,
    /// Root directory for HLS output (`<root>/<userId>/<quality>/index.m3u8`)
    pub hls_root: String,
    /// ffmpeg binary path
    pub ffmpeg_bin: String,
    /// ffprobe binary path
    pub ffprobe_bin: String,
    /// Source probe retry budget
    pub probe_attempts: u32,
    /// Seconds between source probe attempts
    pub probe_delay_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let rtmp_host =
            env::var("ORIGINAL_RTMP_SERVER").unwrap_or_else(|_| String::from("127.0.0.1:1935"));

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| String::from("redis://127.0.0.1/")),
            rtmp_base: format!("rtmp://{}/live", rtmp_host),
            hls_root: env::var("HLS_ROOT").unwrap_or_else(|_| String::from("/tmp/hls")),
            ffmpeg_bin: env::var("FFMPEG_PATH").unwrap_or_else(|_| String::from("ffmpeg")),
            ffprobe_bin: env::var("FFPROBE_PATH").unwrap_or_else(|_| String::from("ffprobe")),
            probe_attempts: env::var("PROBE_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            probe_delay_secs: env::var("PROBE_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
        }
    }
}
