//! Sample encodings accepted on the wire

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VarispeedError};

/// WAVE format tag for integer PCM
const WAVE_FORMAT_PCM: u16 = 1;

/// WAVE format tag for IEEE float
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;

/// Encoding of raw interleaved little-endian PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// 16-bit signed integer samples
    #[default]
    Int16,
    /// 32-bit IEEE-754 float samples
    Float32,
}

impl SampleFormat {
    /// Every supported encoding
    pub const ALL: [SampleFormat; 2] = [SampleFormat::Int16, SampleFormat::Float32];

    /// Bytes per sample
    pub fn sample_size(self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Float32 => 4,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_size(self, channels: usize) -> usize {
        self.sample_size() * channels
    }

    /// Look up an encoding by its WAVE format tag
    ///
    /// # Errors
    /// * `Invalid` - for any tag other than 1 (PCM) or 3 (IEEE float)
    pub fn from_wave_tag(tag: u16) -> Result<Self> {
        match tag {
            WAVE_FORMAT_PCM => Ok(SampleFormat::Int16),
            WAVE_FORMAT_IEEE_FLOAT => Ok(SampleFormat::Float32),
            other => Err(VarispeedError::invalid(format!(
                "format tag {} is not supported",
                other
            ))),
        }
    }

    /// WAVE format tag of this encoding
    pub fn wave_tag(self) -> u16 {
        match self {
            SampleFormat::Int16 => WAVE_FORMAT_PCM,
            SampleFormat::Float32 => WAVE_FORMAT_IEEE_FLOAT,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::Int16 => write!(f, "i16"),
            SampleFormat::Float32 => write!(f, "f32"),
        }
    }
}

impl FromStr for SampleFormat {
    type Err = VarispeedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "i16" | "s16le" | "int16" | "pcm" => Ok(SampleFormat::Int16),
            "f32" | "f32le" | "float32" | "float" => Ok(SampleFormat::Float32),
            other => Err(VarispeedError::invalid(format!(
                "sample format '{}' is not supported (expected i16 or f32)",
                other
            ))),
        }
    }
}
