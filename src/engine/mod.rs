//! Transformation Engine
//!
//! The engine is the stateful processor that changes speed, pitch, rate and
//! volume of interleaved audio. The streaming layer only talks to it through
//! the [`Engine`] trait, so a simulated engine can stand in during tests.
//!
//! Output counts are not a fixed function of input counts: engines buffer
//! lookahead internally, so callers must drain with [`Engine::read_f32`] /
//! [`Engine::read_i16`] until no frames remain.

mod psola;

pub use psola::PsolaEngine;

use crate::error::Result;

// ============================================================================
// Engine Limits
// ============================================================================

/// Minimum volume scale factor
pub const MIN_VOLUME: f32 = 0.01;

/// Maximum volume scale factor
pub const MAX_VOLUME: f32 = 100.0;

/// Minimum speed-up factor
pub const MIN_SPEED: f32 = 0.05;

/// Maximum speed-up factor
pub const MAX_SPEED: f32 = 20.0;

/// Minimum pitch scale factor
pub const MIN_PITCH: f32 = 0.05;

/// Maximum pitch scale factor
pub const MAX_PITCH: f32 = 20.0;

/// Minimum playback rate factor
pub const MIN_RATE: f32 = 0.05;

/// Maximum playback rate factor
pub const MAX_RATE: f32 = 20.0;

/// Minimum supported sample rate in Hz
pub const MIN_SAMPLE_RATE: u32 = 1000;

/// Maximum supported sample rate in Hz
pub const MAX_SAMPLE_RATE: u32 = 500_000;

/// Minimum channel count
pub const MIN_CHANNELS: u32 = 1;

/// Maximum channel count
pub const MAX_CHANNELS: u32 = 32;

// ============================================================================
// Engine Trait
// ============================================================================

/// Capability set of a speed/pitch/rate/volume engine
///
/// An engine is created for a fixed sample rate and channel count and is
/// released by dropping it. All sample slices are interleaved; a frame is
/// `num_channels()` consecutive samples.
pub trait Engine {
    /// Sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Change the sample rate; buffered audio may be discarded
    fn set_sample_rate(&mut self, sample_rate: u32);

    /// Number of interleaved channels
    fn num_channels(&self) -> u32;

    /// Change the channel count; buffered audio may be discarded
    fn set_num_channels(&mut self, channels: u32);

    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);

    fn speed(&self) -> f32;
    fn set_speed(&mut self, speed: f32);

    fn pitch(&self) -> f32;
    fn set_pitch(&mut self, pitch: f32);

    fn rate(&self) -> f32;
    fn set_rate(&mut self, rate: f32);

    /// Whether speed-up heuristics are disabled
    fn quality(&self) -> bool;
    fn set_quality(&mut self, quality: bool);

    /// Push `samples.len() / num_channels()` frames of float input
    ///
    /// Fails with [`EngineWrite`](crate::error::VarispeedError::EngineWrite)
    /// when the engine cannot accept the input.
    fn write_f32(&mut self, samples: &[f32]) -> Result<()>;

    /// Push `samples.len() / num_channels()` frames of 16-bit input
    fn write_i16(&mut self, samples: &[i16]) -> Result<()>;

    /// Read up to `out.len() / num_channels()` frames; returns frames read
    ///
    /// Returns 0 when nothing is ready. Never blocks.
    fn read_f32(&mut self, out: &mut [f32]) -> usize;

    /// Read up to `out.len() / num_channels()` 16-bit frames
    fn read_i16(&mut self, out: &mut [i16]) -> usize;

    /// Make every buffered or lookahead frame available for reading
    fn flush(&mut self) -> Result<()>;

    /// Frames currently ready to read
    fn frames_available(&self) -> usize;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        (**self).set_sample_rate(sample_rate)
    }

    fn num_channels(&self) -> u32 {
        (**self).num_channels()
    }

    fn set_num_channels(&mut self, channels: u32) {
        (**self).set_num_channels(channels)
    }

    fn volume(&self) -> f32 {
        (**self).volume()
    }

    fn set_volume(&mut self, volume: f32) {
        (**self).set_volume(volume)
    }

    fn speed(&self) -> f32 {
        (**self).speed()
    }

    fn set_speed(&mut self, speed: f32) {
        (**self).set_speed(speed)
    }

    fn pitch(&self) -> f32 {
        (**self).pitch()
    }

    fn set_pitch(&mut self, pitch: f32) {
        (**self).set_pitch(pitch)
    }

    fn rate(&self) -> f32 {
        (**self).rate()
    }

    fn set_rate(&mut self, rate: f32) {
        (**self).set_rate(rate)
    }

    fn quality(&self) -> bool {
        (**self).quality()
    }

    fn set_quality(&mut self, quality: bool) {
        (**self).set_quality(quality)
    }

    fn write_f32(&mut self, samples: &[f32]) -> Result<()> {
        (**self).write_f32(samples)
    }

    fn write_i16(&mut self, samples: &[i16]) -> Result<()> {
        (**self).write_i16(samples)
    }

    fn read_f32(&mut self, out: &mut [f32]) -> usize {
        (**self).read_f32(out)
    }

    fn read_i16(&mut self, out: &mut [i16]) -> usize {
        (**self).read_i16(out)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn frames_available(&self) -> usize {
        (**self).frames_available()
    }
}

/// Check that a sample rate lies within the engine limits
pub fn sample_rate_in_range(sample_rate: u32) -> bool {
    (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate)
}
