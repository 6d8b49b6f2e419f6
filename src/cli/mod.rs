//! CLI Module
//!
//! Command-line interface for the varispeed stream processor.

pub mod commands;
pub mod wav;

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::pcm::SampleFormat;
use crate::stream::{
    with_config, with_pitch, with_quality, with_rate, with_speed, with_volume, StreamConfig,
    StreamOption,
};

/// Varispeed - change speed, pitch, rate and volume of PCM audio
#[derive(Parser, Debug)]
#[command(name = "varispeed")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transform a WAV file
    #[command(name = "process")]
    Process {
        /// Input WAV file (16-bit integer or 32-bit float)
        #[arg(short, long)]
        input: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Stream raw PCM from stdin to stdout
    #[command(name = "pipe")]
    Pipe {
        /// Sample rate of the stream in Hz
        #[arg(short, long)]
        sample_rate: u32,

        /// Sample encoding (i16 or f32)
        #[arg(short, long, default_value = "i16")]
        format: SampleFormat,

        /// Interleaved channel count
        #[arg(short, long, default_value_t = 1)]
        channels: u32,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Write a 16-bit mono sine test tone
    #[command(name = "tone")]
    Tone {
        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,

        /// Duration in milliseconds
        #[arg(long, default_value_t = 1000)]
        duration_ms: u32,

        /// Sample rate in Hz
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,

        /// Peak amplitude (0.0 to 1.0)
        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,
    },
}

/// Processing parameters shared by `process` and `pipe`
#[derive(Args, Debug, Clone, Default)]
pub struct ParamArgs {
    /// Playback speed without changing pitch
    #[arg(long)]
    pub speed: Option<f32>,

    /// Pitch factor without changing speed
    #[arg(long)]
    pub pitch: Option<f32>,

    /// Playback rate, changing speed and pitch together
    #[arg(long)]
    pub rate: Option<f32>,

    /// Volume scaling factor
    #[arg(long)]
    pub volume: Option<f32>,

    /// Favour quality over speed in pitch detection
    #[arg(long)]
    pub quality: bool,

    /// JSON preset applied before the individual flags
    #[arg(long)]
    pub preset: Option<PathBuf>,
}

impl ParamArgs {
    /// Build stream options: preset first, then individual flags
    pub fn options(&self) -> anyhow::Result<Vec<StreamOption>> {
        let mut options = Vec::new();

        if let Some(path) = &self.preset {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read preset {}", path.display()))?;
            let preset = StreamConfig::from_json(&json)
                .with_context(|| format!("invalid preset {}", path.display()))?;
            options.push(with_config(preset));
        }

        if let Some(volume) = self.volume {
            options.push(with_volume(volume));
        }
        if let Some(speed) = self.speed {
            options.push(with_speed(speed));
        }
        if let Some(pitch) = self.pitch {
            options.push(with_pitch(pitch));
        }
        if let Some(rate) = self.rate {
            options.push(with_rate(rate));
        }
        if self.quality {
            options.push(with_quality());
        }

        Ok(options)
    }
}
