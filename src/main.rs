//! Monolith binary.
//!
//! Wires up:
//! - Redis adapters (stream records, per-quality job queues, dedup lock)
//! - the process registry and the ffprobe source probe
//! - application services (publish gate, dispatcher, transcode, workers)
//! - the HTTP inbound adapter

use caruso::adapters::ffmpeg::{FfprobeSource, ProbeConfig, RealProbeRunner};
use caruso::adapters::http::{self, AppState};
use caruso::adapters::redis::RedisPool;
use caruso::application::dispatcher::DispatchService;
use caruso::application::publish::PublishService;
use caruso::application::registry::ProcessRegistry;
use caruso::application::transcode::TranscodeService;
use caruso::application::worker::RenditionWorker;
use caruso::config::Config;
use caruso::ports::probe::SourceProbe;
use caruso::ports::transcoder::Transcoder;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::fmt::init();

    // 1. Adapters
    let redis = match RedisPool::new(&config.redis_url) {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            eprintln!("Failed to connect to Redis: {:?}", e);
            std::process::exit(1);
        }
    };

    let probe: Arc<dyn SourceProbe> = Arc::new(FfprobeSource::new(
        RealProbeRunner {
            ffprobe_bin: config.ffprobe_bin.clone(),
        },
        ProbeConfig {
            attempts: config.probe_attempts,
            delay: Duration::from_secs(config.probe_delay_secs),
        },
    ));

    // 2. Process registry - constructed once, injected everywhere
    let registry = Arc::new(ProcessRegistry::new());

    // 3. Application services
    let transcoder: Arc<dyn Transcoder> = Arc::new(TranscodeService::new(
        registry.clone(),
        probe.clone(),
        redis.clone(),
        config.rtmp_base.clone(),
        PathBuf::from(&config.hls_root),
        config.ffmpeg_bin.clone(),
    ));

    let publish = PublishService::new(redis.clone(), transcoder.clone());
    let dispatch = DispatchService::new(redis.clone(), redis.clone(), redis.clone());

    // 4. Rendition workers, one per ladder quality
    let worker = Arc::new(RenditionWorker::new(
        redis.clone(),
        probe.clone(),
        registry.clone(),
        redis.clone(),
        config.rtmp_base.clone(),
        config.ffmpeg_bin.clone(),
    ));
    let handles = worker.start();
    println!("Started {} rendition workers", handles.len());

    // 5. HTTP layer
    let state = Arc::new(AppState {
        publish,
        dispatch,
        transcoder,
    });
    let app = http::router(state);

    // 6. Start server
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    println!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
