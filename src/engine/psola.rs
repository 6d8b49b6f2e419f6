//! Pitch-synchronous overlap-add engine
//!
//! Native implementation of [`Engine`]. Speed changes are made by detecting
//! the pitch period of the input (AMDF search between 65 Hz and 400 Hz) and
//! then dropping or repeating whole periods with linear cross-fades, which
//! keeps the pitch intact. Pitch changes are a time-stretch by
//! `speed / pitch` followed by resampling by `rate * pitch`.
//!
//! Samples are held as `f32` internally. 16-bit input is scaled by 1/32767
//! on the way in and by 32767 (rounded, saturating) on the way out.

use log::debug;

use super::{
    Engine, MAX_CHANNELS, MAX_PITCH, MAX_RATE, MAX_SAMPLE_RATE, MAX_SPEED, MAX_VOLUME,
    MIN_CHANNELS, MIN_PITCH, MIN_RATE, MIN_SAMPLE_RATE, MIN_SPEED, MIN_VOLUME,
};
use crate::error::{Result, VarispeedError};

// ============================================================================
// Constants
// ============================================================================

/// Lowest pitch searched for, in Hz
const MIN_PITCH_HZ: u32 = 65;

/// Highest pitch searched for, in Hz
const MAX_PITCH_HZ: u32 = 400;

/// Pitch search runs on input decimated to roughly this rate
const AMDF_FREQ: u32 = 4000;

/// Integer-ratio resampling keeps both rates below this bound
const MAX_RATE_TERM: usize = 1 << 14;

/// Scale between 16-bit samples and normalized floats
const I16_SCALE: f32 = 32767.0;

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / I16_SCALE
}

#[inline]
fn f32_to_i16(sample: f32) -> i16 {
    (sample * I16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[inline]
fn is_unity(value: f32) -> bool {
    (value - 1.0).abs() <= 0.00001
}

/// Clamp a setter argument, keeping the current value for NaN
#[inline]
fn clamp_or(value: f32, min: f32, max: f32, current: f32) -> f32 {
    if value.is_nan() {
        current
    } else {
        value.clamp(min, max)
    }
}

/// Append `frames` frames that fade from `ramp_down` into `ramp_up`
fn overlap_add(
    out: &mut Vec<f32>,
    frames: usize,
    channels: usize,
    ramp_down: &[f32],
    ramp_up: &[f32],
) {
    out.reserve(frames * channels);
    let width = frames as f32;
    for t in 0..frames {
        let up = t as f32;
        let down = width - up;
        for c in 0..channels {
            let i = t * channels + c;
            out.push((ramp_down[i] * down + ramp_up[i] * up) / width);
        }
    }
}

/// Average magnitude difference search over `min_period..=max_period`
///
/// Returns the best period and the normalized best and worst differences.
fn find_period_in_range(samples: &[f32], min_period: usize, max_period: usize) -> (usize, f32, f32) {
    let mut best_period = 0usize;
    let mut worst_period = 255usize;
    let mut min_diff = 1.0f32;
    let mut max_diff = 0.0f32;

    for period in min_period..=max_period {
        let diff: f32 = samples[..period]
            .iter()
            .zip(&samples[period..2 * period])
            .map(|(a, b)| (a - b).abs())
            .sum();

        if best_period == 0 || diff * (best_period as f32) < min_diff * (period as f32) {
            min_diff = diff;
            best_period = period;
        }
        if diff * (worst_period as f32) > max_diff * (period as f32) {
            max_diff = diff;
            worst_period = period;
        }
    }

    (
        best_period,
        min_diff / best_period as f32,
        max_diff / worst_period as f32,
    )
}

// ============================================================================
// PSOLA Engine
// ============================================================================

/// Native speed/pitch/rate/volume engine
///
/// # Example
/// ```
/// use varispeed::engine::{Engine, PsolaEngine};
///
/// let mut engine = PsolaEngine::new(44100, 1).unwrap();
/// engine.set_speed(2.0);
/// engine.write_i16(&vec![0i16; 4410]).unwrap();
/// engine.flush().unwrap();
///
/// let mut out = vec![0i16; engine.frames_available()];
/// let frames = engine.read_i16(&mut out);
/// assert!(frames > 0 && frames < 4410);
/// ```
#[derive(Debug, Clone)]
pub struct PsolaEngine {
    sample_rate: u32,
    channels: usize,
    volume: f32,
    speed: f32,
    pitch: f32,
    rate: f32,
    quality: bool,

    input: Vec<f32>,
    output: Vec<f32>,
    pitch_buffer: Vec<f32>,
    down_sampled: Vec<f32>,

    min_period: usize,
    max_period: usize,
    max_required: usize,
    remaining_input_to_copy: usize,
    prev_period: usize,
    prev_min_diff: f32,
    old_rate_position: usize,
    new_rate_position: usize,
}

impl PsolaEngine {
    /// Create an engine for the given sample rate and channel count
    ///
    /// # Errors
    /// * `EngineCreate` - if either argument is outside the engine limits
    pub fn new(sample_rate: u32, channels: u32) -> Result<Self> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate)
            || !(MIN_CHANNELS..=MAX_CHANNELS).contains(&channels)
        {
            return Err(VarispeedError::EngineCreate {
                sample_rate,
                channels,
                reason: format!(
                    "supported range is [{}, {}] Hz and [{}, {}] channels",
                    MIN_SAMPLE_RATE, MAX_SAMPLE_RATE, MIN_CHANNELS, MAX_CHANNELS
                ),
            });
        }

        let mut engine = Self {
            sample_rate,
            channels: channels as usize,
            volume: 1.0,
            speed: 1.0,
            pitch: 1.0,
            rate: 1.0,
            quality: false,
            input: Vec::new(),
            output: Vec::new(),
            pitch_buffer: Vec::new(),
            down_sampled: Vec::new(),
            min_period: 0,
            max_period: 0,
            max_required: 0,
            remaining_input_to_copy: 0,
            prev_period: 0,
            prev_min_diff: 0.0,
            old_rate_position: 0,
            new_rate_position: 0,
        };
        engine.allocate();
        debug!(
            "psola engine created: {} Hz, {} channels, max period {} frames",
            sample_rate, channels, engine.max_period
        );
        Ok(engine)
    }

    /// Reset buffers and derived period bounds for the current format
    fn allocate(&mut self) {
        self.min_period = (self.sample_rate / MAX_PITCH_HZ) as usize;
        self.max_period = (self.sample_rate / MIN_PITCH_HZ) as usize;
        self.max_required = 2 * self.max_period;

        let capacity = self.max_required * self.channels;
        self.input = Vec::with_capacity(capacity);
        self.output = Vec::with_capacity(capacity);
        self.pitch_buffer = Vec::with_capacity(capacity);
        self.down_sampled = Vec::with_capacity(self.max_required);

        self.remaining_input_to_copy = 0;
        self.prev_period = 0;
        self.prev_min_diff = 0.0;
        self.old_rate_position = 0;
        self.new_rate_position = 0;
    }

    fn input_frames(&self) -> usize {
        self.input.len() / self.channels
    }

    fn output_frames(&self) -> usize {
        self.output.len() / self.channels
    }

    fn pitch_frames(&self) -> usize {
        self.pitch_buffer.len() / self.channels
    }

    fn check_frame_aligned(&self, samples: usize) -> Result<()> {
        if samples % self.channels != 0 {
            return Err(VarispeedError::EngineWrite {
                reason: format!(
                    "{} samples is not a whole number of {}-channel frames",
                    samples, self.channels
                ),
            });
        }
        Ok(())
    }

    /// Run everything buffered in `input` through the speed, rate and volume stages
    fn process_input(&mut self) {
        let original_output_frames = self.output_frames();
        let speed = self.speed / self.pitch;
        let rate = self.rate * self.pitch;

        if is_unity(speed) {
            self.output.extend_from_slice(&self.input);
            self.input.clear();
        } else {
            self.change_speed(speed);
        }

        if !is_unity(rate) {
            self.adjust_rate(rate, original_output_frames);
        }

        if !is_unity(self.volume) {
            let volume = self.volume;
            for sample in &mut self.output[original_output_frames * self.channels..] {
                *sample = (*sample * volume).clamp(-1.0, 1.0);
            }
        }
    }

    fn change_speed(&mut self, speed: f32) {
        let available = self.input_frames();
        if available < self.max_required {
            return;
        }

        let mut position = 0;
        loop {
            if self.remaining_input_to_copy > 0 {
                position += self.copy_input_to_output(position);
            } else {
                let period = self.find_pitch_period(position, true);
                if speed > 1.0 {
                    let new_frames = self.skip_pitch_period(position, speed, period);
                    position += period + new_frames;
                } else {
                    position += self.insert_pitch_period(position, speed, period);
                }
            }

            if position + self.max_required > available {
                break;
            }
        }

        self.input.drain(..position * self.channels);
    }

    fn copy_input_to_output(&mut self, position: usize) -> usize {
        let frames = self.remaining_input_to_copy.min(self.max_required);
        let start = position * self.channels;
        self.output
            .extend_from_slice(&self.input[start..start + frames * self.channels]);
        self.remaining_input_to_copy -= frames;
        frames
    }

    /// Drop one pitch period, cross-fading across the gap
    fn skip_pitch_period(&mut self, position: usize, speed: f32, period: usize) -> usize {
        let new_frames = if speed >= 2.0 {
            (period as f32 / (speed - 1.0)) as usize
        } else {
            self.remaining_input_to_copy = (period as f32 * (2.0 - speed) / (speed - 1.0)) as usize;
            period
        };

        let start = position * self.channels;
        let shifted = start + period * self.channels;
        overlap_add(
            &mut self.output,
            new_frames,
            self.channels,
            &self.input[start..],
            &self.input[shifted..],
        );
        new_frames
    }

    /// Repeat one pitch period, cross-fading back into the original
    fn insert_pitch_period(&mut self, position: usize, speed: f32, period: usize) -> usize {
        let new_frames = if speed < 0.5 {
            ((period as f32 * speed / (1.0 - speed)) as usize).max(1)
        } else {
            self.remaining_input_to_copy =
                (period as f32 * (2.0 * speed - 1.0) / (1.0 - speed)) as usize;
            period
        };

        let start = position * self.channels;
        let shifted = start + period * self.channels;
        self.output.extend_from_slice(&self.input[start..shifted]);
        overlap_add(
            &mut self.output,
            new_frames,
            self.channels,
            &self.input[shifted..],
            &self.input[start..],
        );
        new_frames
    }

    /// Average `skip` frames (all channels) into each down-sampled value
    fn down_sample_input(&mut self, position: usize, skip: usize) {
        let values = self.max_required / skip;
        let per_value = self.channels * skip;
        let start = position * self.channels;

        self.down_sampled.clear();
        for chunk in self.input[start..start + values * per_value].chunks_exact(per_value) {
            self.down_sampled
                .push(chunk.iter().sum::<f32>() / per_value as f32);
        }
    }

    fn find_pitch_period(&mut self, position: usize, prefer_new_period: bool) -> usize {
        let skip = if self.sample_rate > AMDF_FREQ && !self.quality {
            (self.sample_rate / AMDF_FREQ) as usize
        } else {
            1
        };
        let start = position * self.channels;

        let (period, min_diff, max_diff) = if self.channels == 1 && skip == 1 {
            find_period_in_range(&self.input[start..], self.min_period, self.max_period)
        } else {
            self.down_sample_input(position, skip);
            let coarse = find_period_in_range(
                &self.down_sampled,
                (self.min_period / skip).max(1),
                self.max_period / skip,
            );
            if skip == 1 {
                coarse
            } else {
                // Refine around the coarse estimate at full resolution
                let estimate = coarse.0 * skip;
                let low = estimate.saturating_sub(skip * 4).max(self.min_period);
                let high = (estimate + skip * 4).min(self.max_period);
                if self.channels == 1 {
                    find_period_in_range(&self.input[start..], low, high)
                } else {
                    self.down_sample_input(position, 1);
                    find_period_in_range(&self.down_sampled, low, high)
                }
            }
        };

        let chosen = if self.prev_period_better(min_diff, max_diff, prefer_new_period) {
            self.prev_period
        } else {
            period
        };
        self.prev_min_diff = min_diff;
        self.prev_period = period;
        chosen
    }

    fn prev_period_better(&self, min_diff: f32, max_diff: f32, prefer_new_period: bool) -> bool {
        if min_diff == 0.0 || self.prev_period == 0 {
            return false;
        }
        if prefer_new_period {
            if max_diff > min_diff * 3.0 {
                return false;
            }
            if min_diff * 2.0 <= self.prev_min_diff * 3.0 {
                return false;
            }
        } else if min_diff <= self.prev_min_diff {
            return false;
        }
        true
    }

    /// Resample output produced since `original_output_frames` by `rate`
    fn adjust_rate(&mut self, rate: f32, original_output_frames: usize) {
        let mut new_rate = ((self.sample_rate as f32 / rate) as usize).max(1);
        let mut old_rate = self.sample_rate as usize;
        while new_rate > MAX_RATE_TERM || old_rate > MAX_RATE_TERM {
            new_rate = (new_rate >> 1).max(1);
            old_rate >>= 1;
        }

        if self.output_frames() == original_output_frames {
            return;
        }

        let channels = self.channels;
        self.pitch_buffer
            .extend(self.output.drain(original_output_frames * channels..));

        // Leave at least one frame behind to interpolate against
        let pitch_frames = self.pitch_frames();
        let mut position = 0;
        while position + 1 < pitch_frames {
            while (self.old_rate_position + 1) * new_rate > self.new_rate_position * old_rate {
                for c in 0..channels {
                    let sample = self.interpolate(position, c, old_rate, new_rate);
                    self.output.push(sample);
                }
                self.new_rate_position += 1;
            }
            self.old_rate_position += 1;
            if self.old_rate_position == old_rate {
                self.old_rate_position = 0;
                self.new_rate_position = 0;
            }
            position += 1;
        }

        self.pitch_buffer.drain(..position * channels);
    }

    fn interpolate(&self, position: usize, channel: usize, old_rate: usize, new_rate: usize) -> f32 {
        let left = self.pitch_buffer[position * self.channels + channel];
        let right = self.pitch_buffer[(position + 1) * self.channels + channel];

        let target = (self.new_rate_position * old_rate) as i64;
        let left_position = (self.old_rate_position * new_rate) as i64;
        let right_position = ((self.old_rate_position + 1) * new_rate) as i64;
        let ratio = (right_position - target - 1) as f32;
        let width = (right_position - left_position) as f32;

        (left * ratio + right * (width - ratio)) / width
    }

    /// Move up to `max_frames` frames out of the output buffer
    fn take_output(&mut self, max_frames: usize) -> std::vec::Drain<'_, f32> {
        let frames = self.output_frames().min(max_frames);
        self.output.drain(..frames * self.channels)
    }
}

impl Engine for PsolaEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE);
        self.allocate();
    }

    fn num_channels(&self) -> u32 {
        self.channels as u32
    }

    fn set_num_channels(&mut self, channels: u32) {
        self.channels = channels.clamp(MIN_CHANNELS, MAX_CHANNELS) as usize;
        self.allocate();
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_or(volume, MIN_VOLUME, MAX_VOLUME, self.volume);
    }

    fn speed(&self) -> f32 {
        self.speed
    }

    fn set_speed(&mut self, speed: f32) {
        self.speed = clamp_or(speed, MIN_SPEED, MAX_SPEED, self.speed);
    }

    fn pitch(&self) -> f32 {
        self.pitch
    }

    fn set_pitch(&mut self, pitch: f32) {
        self.pitch = clamp_or(pitch, MIN_PITCH, MAX_PITCH, self.pitch);
    }

    fn rate(&self) -> f32 {
        self.rate
    }

    fn set_rate(&mut self, rate: f32) {
        self.rate = clamp_or(rate, MIN_RATE, MAX_RATE, self.rate);
    }

    fn quality(&self) -> bool {
        self.quality
    }

    fn set_quality(&mut self, quality: bool) {
        self.quality = quality;
    }

    fn write_f32(&mut self, samples: &[f32]) -> Result<()> {
        self.check_frame_aligned(samples.len())?;
        self.input.extend_from_slice(samples);
        self.process_input();
        Ok(())
    }

    fn write_i16(&mut self, samples: &[i16]) -> Result<()> {
        self.check_frame_aligned(samples.len())?;
        self.input.extend(samples.iter().copied().map(i16_to_f32));
        self.process_input();
        Ok(())
    }

    fn read_f32(&mut self, out: &mut [f32]) -> usize {
        let channels = self.channels;
        let max_frames = out.len() / channels;
        let mut read = 0;
        for (slot, sample) in out.iter_mut().zip(self.take_output(max_frames)) {
            *slot = sample;
            read += 1;
        }
        read / channels
    }

    fn read_i16(&mut self, out: &mut [i16]) -> usize {
        let channels = self.channels;
        let max_frames = out.len() / channels;
        let mut read = 0;
        for (slot, sample) in out.iter_mut().zip(self.take_output(max_frames)) {
            *slot = f32_to_i16(sample);
            read += 1;
        }
        read / channels
    }

    fn flush(&mut self) -> Result<()> {
        let remaining = self.input_frames() as f32;
        let speed = self.speed / self.pitch;
        let rate = self.rate * self.pitch;
        let expected = self.output_frames()
            + ((remaining / speed + self.pitch_frames() as f32) / rate + 0.5) as usize;

        // Pad with enough silence to push both input and pitch buffers through
        let padding = 2 * self.max_required * self.channels;
        self.input.resize(self.input.len() + padding, 0.0);
        self.process_input();

        // Drop whatever the padding produced beyond the expected length
        if self.output_frames() > expected {
            self.output.truncate(expected * self.channels);
        }

        self.input.clear();
        self.pitch_buffer.clear();
        self.remaining_input_to_copy = 0;
        Ok(())
    }

    fn frames_available(&self) -> usize {
        self.output_frames()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn sine(frequency: f32, sample_rate: u32, frames: usize, amplitude: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn drain_f32(engine: &mut PsolaEngine) -> Vec<f32> {
        let mut all = Vec::new();
        let mut buf = vec![0.0f32; 512 * engine.channels];
        loop {
            let frames = engine.read_f32(&mut buf);
            if frames == 0 {
                break;
            }
            all.extend_from_slice(&buf[..frames * engine.channels]);
        }
        all
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(matches!(
            PsolaEngine::new(MIN_SAMPLE_RATE - 1, 1),
            Err(VarispeedError::EngineCreate { .. })
        ));
        assert!(matches!(
            PsolaEngine::new(44100, 0),
            Err(VarispeedError::EngineCreate { .. })
        ));
        assert!(matches!(
            PsolaEngine::new(44100, MAX_CHANNELS + 1),
            Err(VarispeedError::EngineCreate { .. })
        ));
    }

    #[test]
    fn test_defaults() {
        let engine = PsolaEngine::new(44100, 2).unwrap();
        assert_eq!(engine.num_channels(), 2);
        assert_relative_eq!(engine.speed(), 1.0);
        assert_relative_eq!(engine.pitch(), 1.0);
        assert_relative_eq!(engine.rate(), 1.0);
        assert_relative_eq!(engine.volume(), 1.0);
        assert!(!engine.quality());
    }

    #[test]
    fn test_setters_clamp() {
        let mut engine = PsolaEngine::new(44100, 1).unwrap();
        engine.set_speed(100.0);
        engine.set_pitch(0.0);
        engine.set_volume(f32::NAN);
        assert_relative_eq!(engine.speed(), MAX_SPEED);
        assert_relative_eq!(engine.pitch(), MIN_PITCH);
        assert_relative_eq!(engine.volume(), 1.0);
    }

    #[test]
    fn test_identity_passes_samples_through() {
        let mut engine = PsolaEngine::new(44100, 1).unwrap();
        let input: Vec<i16> = (0..1000).map(|i| (i * 31 % 2000 - 1000) as i16).collect();
        engine.write_i16(&input).unwrap();
        engine.flush().unwrap();

        let mut out = vec![0i16; engine.frames_available()];
        let frames = engine.read_i16(&mut out);
        assert_eq!(frames, input.len());
        assert_eq!(out, input);
    }

    #[test]
    fn test_speed_up_shortens_output() {
        let mut engine = PsolaEngine::new(44100, 1).unwrap();
        engine.set_speed(2.0);
        let input = sine(200.0, 44100, 44100, 0.5);
        engine.write_f32(&input).unwrap();
        engine.flush().unwrap();

        let out = drain_f32(&mut engine);
        let ratio = out.len() as f32 / input.len() as f32;
        assert!(ratio > 0.4 && ratio < 0.6, "ratio was {}", ratio);
    }

    #[test]
    fn test_slow_down_lengthens_output() {
        let mut engine = PsolaEngine::new(22050, 1).unwrap();
        engine.set_speed(0.5);
        let input = sine(150.0, 22050, 22050, 0.5);
        engine.write_f32(&input).unwrap();
        engine.flush().unwrap();

        let out = drain_f32(&mut engine);
        let ratio = out.len() as f32 / input.len() as f32;
        assert!(ratio > 1.8 && ratio < 2.2, "ratio was {}", ratio);
    }

    #[test]
    fn test_rate_resamples() {
        let mut engine = PsolaEngine::new(16000, 1).unwrap();
        engine.set_rate(2.0);
        let input = sine(300.0, 16000, 16000, 0.5);
        engine.write_f32(&input).unwrap();
        engine.flush().unwrap();

        let out = drain_f32(&mut engine);
        let ratio = out.len() as f32 / input.len() as f32;
        assert!(ratio > 0.45 && ratio < 0.55, "ratio was {}", ratio);
    }

    #[test]
    fn test_pitch_keeps_duration() {
        let mut engine = PsolaEngine::new(16000, 1).unwrap();
        engine.set_pitch(1.5);
        let input = sine(220.0, 16000, 16000, 0.5);
        engine.write_f32(&input).unwrap();
        engine.flush().unwrap();

        let out = drain_f32(&mut engine);
        let ratio = out.len() as f32 / input.len() as f32;
        assert!(ratio > 0.9 && ratio < 1.1, "ratio was {}", ratio);
    }

    #[test]
    fn test_volume_scales_and_clips() {
        let mut engine = PsolaEngine::new(8000, 1).unwrap();
        engine.set_volume(2.0);
        engine.write_f32(&[0.25, -0.25, 0.75, -0.75]).unwrap();

        let mut out = [0.0f32; 4];
        assert_eq!(engine.read_f32(&mut out), 4);
        assert_relative_eq!(out[0], 0.5);
        assert_relative_eq!(out[1], -0.5);
        assert_relative_eq!(out[2], 1.0);
        assert_relative_eq!(out[3], -1.0);
    }

    #[test]
    fn test_read_respects_buffer_size() {
        let mut engine = PsolaEngine::new(8000, 2).unwrap();
        engine.write_f32(&[0.1; 20]).unwrap();
        assert_eq!(engine.frames_available(), 10);

        let mut out = [0.0f32; 7];
        assert_eq!(engine.read_f32(&mut out), 3);
        assert_eq!(engine.frames_available(), 7);
    }

    #[test]
    fn test_read_i16_stops_at_whole_frames() {
        let mut engine = PsolaEngine::new(8000, 2).unwrap();
        engine.write_i16(&[1000; 20]).unwrap();

        let mut out = [0i16; 5];
        assert_eq!(engine.read_i16(&mut out), 2);
        assert_eq!(&out[..4], &[1000; 4]);
        assert_eq!(out[4], 0);
        assert_eq!(engine.frames_available(), 8);
    }

    #[test]
    fn test_write_rejects_partial_frame() {
        let mut engine = PsolaEngine::new(8000, 2).unwrap();
        let err = engine.write_i16(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, VarispeedError::EngineWrite { .. }));
        assert_eq!(engine.frames_available(), 0);
    }

    #[test]
    fn test_silence_stays_silent_in_stereo() {
        let mut engine = PsolaEngine::new(48000, 2).unwrap();
        engine.set_speed(1.7);
        engine.set_pitch(0.8);
        engine.write_f32(&vec![0.0; 48000 * 2]).unwrap();
        engine.flush().unwrap();

        let out = drain_f32(&mut engine);
        assert!(!out.is_empty());
        assert_eq!(out.len() % 2, 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_flush_on_empty_engine_produces_nothing() {
        let mut engine = PsolaEngine::new(44100, 1).unwrap();
        engine.set_speed(3.0);
        engine.flush().unwrap();
        assert_eq!(engine.frames_available(), 0);
    }

    #[test]
    fn test_quality_mode_still_changes_speed() {
        let mut engine = PsolaEngine::new(44100, 1).unwrap();
        engine.set_quality(true);
        engine.set_speed(1.5);
        let input = sine(180.0, 44100, 22050, 0.4);
        engine.write_f32(&input).unwrap();
        engine.flush().unwrap();

        let out = drain_f32(&mut engine);
        let ratio = out.len() as f32 / input.len() as f32;
        assert!(ratio > 0.55 && ratio < 0.8, "ratio was {}", ratio);
    }

    #[test]
    fn test_changing_channels_discards_buffers() {
        let mut engine = PsolaEngine::new(8000, 1).unwrap();
        engine.write_f32(&[0.1; 16]).unwrap();
        engine.set_num_channels(2);
        assert_eq!(engine.num_channels(), 2);
        assert_eq!(engine.frames_available(), 0);
    }

    #[test]
    fn test_sample_conversion_round_trips() {
        for sample in [i16::MIN + 1, -1000, 0, 1, 12345, i16::MAX] {
            assert_eq!(f32_to_i16(i16_to_f32(sample)), sample);
        }
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), i16::MIN);
    }
}
