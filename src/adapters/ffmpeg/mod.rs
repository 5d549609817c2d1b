//! ffmpeg/ffprobe adapters.

pub mod probe;

pub use probe::{FfprobeSource, ProbeConfig, RealProbeRunner};
