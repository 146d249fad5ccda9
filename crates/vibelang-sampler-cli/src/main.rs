//! VibeLang sampler CLI - the `vibesampler` command.
//!
//! Drives the sampler engine offline: loads a TOML instrument, replays a
//! scripted list of MIDI events and parameter automation through the
//! audio-thread processor block by block, and reports voice activity.

mod instrument;
mod script;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vibelang_sampler::{Notification, SamplerConfig, SamplerProcessor};

use crate::instrument::{parse_instrument, TomlInstrumentLoader};
use crate::script::Script;

/// VibeLang sampler - SFZ trigger engine driver
#[derive(Parser, Debug)]
#[command(name = "vibesampler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replay MIDI scripts through the VibeLang sampler engine", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a script through an instrument
    Play {
        /// Instrument file (TOML header tables)
        #[arg(value_name = "INSTRUMENT")]
        instrument: PathBuf,

        /// Event script (TOML)
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        /// Engine configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Frames per block
        #[arg(short, long)]
        block_size: Option<usize>,

        /// Sample rate in Hz
        #[arg(short = 'r', long)]
        sample_rate: Option<f32>,

        /// Seconds to keep rendering after the last event
        #[arg(long, default_value = "1.0")]
        tail: f32,

        /// Random seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List the regions of an instrument
    Regions {
        /// Instrument file (TOML header tables)
        #[arg(value_name = "INSTRUMENT")]
        instrument: PathBuf,
    },

    /// Print the default engine configuration
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    match args.command {
        Commands::Play {
            instrument,
            script,
            config,
            block_size,
            sample_rate,
            tail,
            seed,
        } => {
            let mut config = match config {
                Some(path) => SamplerConfig::load(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => SamplerConfig::default(),
            };
            if let Some(block_size) = block_size {
                config.samples_per_block = block_size;
            }
            if let Some(sample_rate) = sample_rate {
                config.sample_rate = sample_rate;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            config.validate();
            play(&config, instrument, script, tail)
        }
        Commands::Regions { instrument } => list_regions(instrument),
        Commands::Config => {
            print!("{}", SamplerConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

/// Summary of a replay.
#[derive(Debug, Default)]
struct Report {
    blocks: usize,
    busy_blocks: usize,
    max_voices: u32,
    peak: f32,
}

fn play(config: &SamplerConfig, instrument: PathBuf, script: PathBuf, tail: f32) -> Result<()> {
    let script = Script::load(&script)?;
    let (mut processor, controller) =
        SamplerProcessor::create(config, Arc::new(TomlInstrumentLoader))?;
    let regions = controller.load_instrument(&instrument)?;

    println!("Instrument: {} ({} regions)", instrument.display(), regions);
    println!(
        "Script:     {} events, {} automation points",
        script.event.len(),
        script.automation.len()
    );
    println!();

    let block_size = config.samples_per_block;
    let tail_frames = (tail.max(0.0) * config.sample_rate) as u64;
    let total = script.end_frame() + tail_frames;

    let mut left = vec![0.0f32; block_size];
    let mut right = vec![0.0f32; block_size];
    let mut report = Report::default();
    let mut last_voices = 0;
    let mut start = 0u64;

    while start < total {
        let block = script.block(start, block_size);
        if !processor.process(&block.events, &block.parameters, &mut left, &mut right) {
            report.busy_blocks += 1;
        }

        let voices = processor.active_voices();
        if voices != last_voices {
            let seconds = start as f64 / config.sample_rate as f64;
            println!("{:>9.3}s  {:>3} voices", seconds, voices);
            last_voices = voices;
        }
        report.max_voices = report.max_voices.max(voices);
        report.peak = left
            .iter()
            .chain(right.iter())
            .fold(report.peak, |peak, s| peak.max(s.abs()));
        report.blocks += 1;
        start += block_size as u64;

        while let Some(notification) = controller.try_recv_notification() {
            log_notification(&notification);
        }
    }

    processor.stop();

    println!();
    println!("Rendered {} blocks of {} frames", report.blocks, block_size);
    println!("Max voices: {}", report.max_voices);
    println!("Peak level: {:.4}", report.peak);
    if report.busy_blocks > 0 {
        println!("Silent blocks (engine busy): {}", report.busy_blocks);
    }
    Ok(())
}

fn log_notification(notification: &Notification) {
    match notification {
        Notification::PlayState { active_voices } => log::debug!("{} voices playing", active_voices),
        Notification::ReloadChecked { reloaded, ok } => {
            log::info!("Reload check: reloaded={} ok={}", reloaded, ok)
        }
        Notification::InstrumentLoaded { path, regions } => {
            log::info!("Loaded {} ({} regions)", path.display(), regions)
        }
        Notification::LoadFailed { path, reason } => {
            log::warn!("Failed to load {}: {}", path.display(), reason)
        }
    }
}

fn list_regions(instrument: PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(&instrument)
        .with_context(|| format!("Failed to read {}", instrument.display()))?;
    let regions = parse_instrument(&text)?;

    println!("{} regions in {}", regions.len(), instrument.display());
    for region in &regions {
        println!(
            "  #{:<3} {:<24} keys {:>3}-{:<3} vel {:>3}-{:<3} trigger {:?}",
            region.id,
            region.sample,
            region.key_range.start,
            region.key_range.end,
            region.velocity_range.start,
            region.velocity_range.end,
            region.trigger
        );
    }
    Ok(())
}
