//! Caruso - Live Stream Transcoding Orchestrator
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (stream state machine, publish names, ffmpeg args)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations (Redis, ffprobe, HTTP)
//! - application/: Services (publish gate, dispatcher, workers, process registry)
//! - config: Environment configuration
//!
//! The RTMP relay terminating the publish protocol is an external collaborator:
//! it calls the `on_publish`/`on_publish_done` webhooks and serves the HLS
//! output that the ffmpeg processes spawned here write to disk.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
pub use application::registry::ProcessRegistry;
pub use config::Config;
