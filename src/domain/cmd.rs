//! ffmpeg invocation construction.
//!
//! Pure functions from (ladder config, probed source) to an ordered argument
//! list, testable without spawning anything. Two shapes exist: the eager
//! multi-output invocation that splits one decoded input into N scaled HLS
//! branches, and the single-output invocation used by the on-demand workers.

use crate::domain::stream::Quality;
use std::path::{Path, PathBuf};

/// Encoding parameters for one ladder rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityProfile {
    pub quality: Quality,
    pub width: u32,
    pub height: u32,
    pub video_bitrate: &'static str,
    pub audio_bitrate: &'static str,
}

impl QualityProfile {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

const LADDER: [QualityProfile; 6] = [
    QualityProfile {
        quality: Quality::P144,
        width: 256,
        height: 144,
        video_bitrate: "400k",
        audio_bitrate: "64k",
    },
    QualityProfile {
        quality: Quality::P240,
        width: 426,
        height: 240,
        video_bitrate: "700k",
        audio_bitrate: "96k",
    },
    QualityProfile {
        quality: Quality::P360,
        width: 640,
        height: 360,
        video_bitrate: "1000k",
        audio_bitrate: "96k",
    },
    QualityProfile {
        quality: Quality::P480,
        width: 854,
        height: 480,
        video_bitrate: "1500k",
        audio_bitrate: "128k",
    },
    QualityProfile {
        quality: Quality::P720,
        width: 1280,
        height: 720,
        video_bitrate: "2500k",
        audio_bitrate: "128k",
    },
    QualityProfile {
        quality: Quality::P1080,
        width: 1920,
        height: 1080,
        video_bitrate: "4500k",
        audio_bitrate: "192k",
    },
];

pub fn profile_for(quality: Quality) -> Option<&'static QualityProfile> {
    LADDER.iter().find(|p| p.quality == quality)
}

/// Ladder rungs that fit under the probed source height. Never upscale.
pub fn applicable(source_height: u32) -> Vec<&'static QualityProfile> {
    LADDER.iter().filter(|p| p.height <= source_height).collect()
}

/// Output directory for one rendition: `<root>/<userId>/<quality>`.
pub fn output_dir(hls_root: &Path, user_id: &str, quality: Quality) -> PathBuf {
    hls_root.join(user_id).join(quality.to_string())
}

/// `[0:v]split=N[v0][v1]…; [v0]scale=WxH[vout0]; …`
pub fn filter_complex(profiles: &[&QualityProfile]) -> String {
    let split_labels: String = (0..profiles.len()).map(|i| format!("[v{}]", i)).collect();
    let scale_filters: Vec<String> = profiles
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[v{}]scale={}[vout{}]", i, p.resolution(), i))
        .collect();
    format!(
        "[0:v]split={}{}; {}",
        profiles.len(),
        split_labels,
        scale_filters.join("; ")
    )
}

fn push_hls_output(args: &mut Vec<String>, dir: &Path) {
    let segment_pattern = dir.join("segment_%03d.ts");
    let playlist = dir.join("index.m3u8");
    args.extend(
        [
            "-strict",
            "-2",
            "-f",
            "hls",
            "-hls_time",
            "4",
            "-hls_list_size",
            "6",
            "-hls_flags",
            "delete_segments+omit_endlist",
            "-hls_segment_filename",
        ]
        .map(String::from),
    );
    args.push(segment_pattern.to_string_lossy().into_owned());
    args.push(playlist.to_string_lossy().into_owned());
}

fn input_args(input_url: &str) -> Vec<String> {
    [
        "-y",
        "-analyzeduration",
        "10000000",
        "-probesize",
        "10000000",
        "-i",
        input_url,
    ]
    .map(String::from)
    .to_vec()
}

/// One process, one input, one filter graph splitting into a branch per
/// profile, each muxed with the shared audio into its own HLS target.
pub fn ladder_args(
    input_url: &str,
    hls_root: &Path,
    user_id: &str,
    profiles: &[&QualityProfile],
) -> Vec<String> {
    let mut args = input_args(input_url);
    args.push("-filter_complex".into());
    args.push(filter_complex(profiles));

    for (i, profile) in profiles.iter().enumerate() {
        args.push("-map".into());
        args.push(format!("[vout{}]", i));
        args.push("-map".into());
        args.push("a".into());
        args.push(format!("-c:v:{}", i));
        args.push("libx264".into());
        args.push(format!("-b:v:{}", i));
        args.push(profile.video_bitrate.into());
        args.push(format!("-c:a:{}", i));
        args.push("aac".into());
        args.push(format!("-b:a:{}", i));
        args.push(profile.audio_bitrate.into());
        push_hls_output(&mut args, &output_dir(hls_root, user_id, profile.quality));
    }
    args
}

/// One process for one quality: scale, encode, publish back to the relay
/// under the public output key. The relay fires the derived-publish webhook
/// and materializes the HLS playlist the viewer is polling.
pub fn single_args(input_url: &str, destination: &str, profile: &QualityProfile) -> Vec<String> {
    let mut args = input_args(input_url);
    args.push("-vf".into());
    args.push(format!("scale={}", profile.resolution()));
    args.extend(["-c:v", "libx264", "-b:v"].map(String::from));
    args.push(profile.video_bitrate.into());
    args.extend(["-c:a", "aac", "-b:a"].map(String::from));
    args.push(profile.audio_bitrate.into());
    args.extend(["-f", "flv"].map(String::from));
    args.push(destination.into());
    args
}
