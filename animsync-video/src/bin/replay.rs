/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use std::path::PathBuf;
use std::sync::Arc;

use animsync_types::TimeRange;
use animsync_video::resource::{DecodeResource, SeekBehavior, SimulatedVideo};
use animsync_video::{LocalVideoReader, ManualClock, SyncConfig, VideoReader};
use anyhow::{bail, Context};
use clap::Parser;
use log::info;

/// Replays a sequence of target frames against a simulated video and prints
/// what the synchronizer did for each one.
#[derive(Parser, Debug)]
#[clap(name = "animsync-replay")]
struct Opt {
    /// JSON sync config to start from. Flags below override its fields.
    #[clap(long = "config")]
    config: Option<PathBuf>,

    #[clap(long = "fps")]
    fps: Option<f64>,

    #[clap(long = "width")]
    width: Option<u32>,

    #[clap(long = "height")]
    height: Option<u32>,

    /// Static frame range as `start:end`, end exclusive. May be repeated.
    #[clap(long = "static-range", value_parser = parse_time_range)]
    static_ranges: Vec<TimeRange>,

    /// Target frames to request, in order.
    #[clap(long = "frames", value_delimiter = ',', default_value = "0,15,16,100")]
    frames: Vec<i64>,

    /// Wall time between requests in milliseconds. Defaults to one frame period.
    #[clap(long = "step-ms")]
    step_ms: Option<f64>,

    /// Never confirm seeks, so every seek runs into its timeout.
    #[clap(long = "drop-seeks")]
    drop_seeks: bool,
}

fn parse_time_range(value: &str) -> Result<TimeRange, String> {
    let (start, end) = value
        .split_once(':')
        .ok_or_else(|| format!("expected start:end, got {value}"))?;
    let start = start
        .trim()
        .parse::<i64>()
        .map_err(|err| format!("invalid start {start}: {err}"))?;
    let end = end
        .trim()
        .parse::<i64>()
        .map_err(|err| format!("invalid end {end}: {err}"))?;
    Ok(TimeRange::new(start, end))
}

fn build_config(opt: &Opt) -> anyhow::Result<SyncConfig> {
    let mut config = match &opt.config {
        Some(path) => SyncConfig::from_json_file(path)?,
        None => SyncConfig::default(),
    };
    if let Some(fps) = opt.fps {
        config.frame_rate = fps;
    }
    if let Some(width) = opt.width {
        config.width = width;
    }
    if let Some(height) = opt.height {
        config.height = height;
    }
    if !opt.static_ranges.is_empty() {
        config.static_time_ranges = opt.static_ranges.clone();
    }
    config.validate().context("invalid sync config")?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::parse();
    let config = build_config(&opt)?;
    if opt.frames.is_empty() {
        bail!("no frames to replay");
    }

    let step_ms = opt
        .step_ms
        .unwrap_or(1000.0 / config.frame_rate)
        .max(0.0);
    let seek_behavior = if opt.drop_seeks {
        SeekBehavior::Never
    } else {
        SeekBehavior::Immediate
    };
    let video = SimulatedVideo::new(config.frame_rate, config.width, config.height)
        .with_seek_behavior(seek_behavior);
    let clock = ManualClock::new(0.0);
    let mut reader =
        LocalVideoReader::new(Box::new(video.clone()), config.clone(), Arc::new(clock.clone()))?;

    info!(
        "replaying {} frames at {} fps, {step_ms:.1} ms apart",
        opt.frames.len(),
        config.frame_rate
    );
    println!("frame  ready  seek      time(s)  rate   state");
    for (index, &frame) in opt.frames.iter().enumerate() {
        if index > 0 {
            clock.advance(step_ms);
            video.advance(step_ms);
        }
        let seeks_before = video.seeks().len();
        let ready = reader.prepare(frame).await?;
        let seeks = video.seeks();
        let seek = if seeks.len() > seeks_before {
            format!("{:.3}", seeks[seeks.len() - 1])
        } else {
            "-".to_string()
        };
        println!(
            "{frame:>5}  {ready:<5}  {seek:<8}  {:>7.3}  {:<5.3}  {}",
            video.current_time(),
            video.playback_rate(),
            if video.paused() { "paused" } else { "playing" }
        );
    }

    reader.on_destroy()?;
    Ok(())
}
