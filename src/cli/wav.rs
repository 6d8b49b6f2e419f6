//! WAV file plumbing for the CLI
//!
//! Bridges `hound` readers and writers to the raw byte interface of the
//! transformer.

use std::f32::consts::PI;
use std::io::{self, Seek, Write};

use anyhow::bail;
use hound::{WavSpec, WavWriter};

use crate::pcm::{PcmSample, SampleFormat};

/// Map a WAV spec onto a supported wire encoding
pub fn sample_format_of(spec: &WavSpec) -> anyhow::Result<SampleFormat> {
    match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => Ok(SampleFormat::Int16),
        (hound::SampleFormat::Float, 32) => Ok(SampleFormat::Float32),
        (kind, bits) => bail!(
            "{}-bit {:?} WAV audio is not supported (expected 16-bit int or 32-bit float)",
            bits,
            kind
        ),
    }
}

fn hound_to_io(error: hound::Error) -> io::Error {
    match error {
        hound::Error::IoError(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

/// Byte sink that decodes little-endian samples into a [`WavWriter`]
///
/// Bytes that do not yet form a whole sample are held until the next write.
/// If the writer fails partway, only the samples it accepted are dropped
/// from the held bytes, so nothing is written twice.
pub struct WavSink<'w, W: Write + Seek> {
    writer: &'w mut WavWriter<W>,
    format: SampleFormat,
    pending: Vec<u8>,
}

impl<'w, W: Write + Seek> WavSink<'w, W> {
    pub fn new(writer: &'w mut WavWriter<W>, format: SampleFormat) -> Self {
        Self {
            writer,
            format,
            pending: Vec::new(),
        }
    }
}

impl<W: Write + Seek> Write for WavSink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let carried = self.pending.len();
        self.pending.extend_from_slice(buf);

        let size = self.format.sample_size();
        let whole = self.pending.len() - self.pending.len() % size;
        let mut written = 0;
        let mut failure = None;
        for bytes in self.pending[..whole].chunks_exact(size) {
            let result = match self.format {
                SampleFormat::Int16 => self.writer.write_sample(i16::from_le_slice(bytes)),
                SampleFormat::Float32 => self.writer.write_sample(f32::from_le_slice(bytes)),
            };
            if let Err(error) = result {
                failure = Some(error);
                break;
            }
            written += size;
        }

        if let Some(error) = failure {
            // Report only the part of `buf` that reached the writer
            let from_buf = written.saturating_sub(carried);
            if from_buf == 0 {
                self.pending.truncate(carried);
                return Err(hound_to_io(error));
            }
            self.pending.clear();
            return Ok(from_buf);
        }
        self.pending.drain(..whole);

        Ok(buf.len())
    }

    // The header is completed by `WavWriter::finalize`
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Generate a 16-bit sine tone
pub fn sine_tone(frequency: f32, duration_ms: u32, sample_rate: u32, amplitude: f32) -> Vec<i16> {
    let frames = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
    (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let value = amplitude * (2.0 * PI * frequency * t).sin();
            (value * i16::MAX as f32).round() as i16
        })
        .collect()
}
