//! Byte buffer to sample frame conversion
//!
//! Byte buffers are never reinterpreted in place. A [`FrameView`] checks
//! length and alignment up front and then decodes little-endian samples
//! into a typed buffer on demand; [`encode_samples`] is the inverse.

use std::fmt::Debug;

use super::SampleFormat;
use crate::engine::Engine;
use crate::error::{Result, VarispeedError};

// ============================================================================
// Sample Types
// ============================================================================

/// A sample type that can travel between the wire and an [`Engine`]
pub trait PcmSample: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Encoding this type corresponds to
    const FORMAT: SampleFormat;

    /// Decode one sample from exactly `FORMAT.sample_size()` bytes
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding of this sample
    fn extend_le(self, out: &mut Vec<u8>);

    /// Push interleaved samples into the engine
    fn write_to<E: Engine + ?Sized>(engine: &mut E, samples: &[Self]) -> Result<()>;

    /// Read interleaved samples out of the engine; returns frames read
    fn read_from<E: Engine + ?Sized>(engine: &mut E, out: &mut [Self]) -> usize;
}

impl PcmSample for i16 {
    const FORMAT: SampleFormat = SampleFormat::Int16;

    #[inline]
    fn from_le_slice(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }

    #[inline]
    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn write_to<E: Engine + ?Sized>(engine: &mut E, samples: &[Self]) -> Result<()> {
        engine.write_i16(samples)
    }

    fn read_from<E: Engine + ?Sized>(engine: &mut E, out: &mut [Self]) -> usize {
        engine.read_i16(out)
    }
}

impl PcmSample for f32 {
    const FORMAT: SampleFormat = SampleFormat::Float32;

    #[inline]
    fn from_le_slice(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    #[inline]
    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn write_to<E: Engine + ?Sized>(engine: &mut E, samples: &[Self]) -> Result<()> {
        engine.write_f32(samples)
    }

    fn read_from<E: Engine + ?Sized>(engine: &mut E, out: &mut [Self]) -> usize {
        engine.read_f32(out)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Check that `len` bytes hold a whole number of samples
///
/// # Errors
/// * `Invalid` - if `len` is not a multiple of the sample size
pub fn check_sample_alignment(len: usize, format: SampleFormat) -> Result<()> {
    let size = format.sample_size();
    if len % size != 0 {
        return Err(VarispeedError::invalid(format!(
            "buffer of {} bytes is not a multiple of the {} sample size ({} bytes)",
            len, format, size
        )));
    }
    Ok(())
}

// ============================================================================
// Frame View
// ============================================================================

/// Validated view of a byte buffer as interleaved frames
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    bytes: &'a [u8],
    format: SampleFormat,
    channels: usize,
}

impl<'a> FrameView<'a> {
    /// View `bytes` as whole frames
    ///
    /// # Errors
    /// * `Invalid` - if `channels` is zero or the length is not a multiple
    ///   of `channels * sample_size`
    pub fn new(bytes: &'a [u8], format: SampleFormat, channels: usize) -> Result<Self> {
        let (view, rest) = Self::split_whole_frames(bytes, format, channels)?;
        if !rest.is_empty() {
            return Err(VarispeedError::invalid(format!(
                "buffer of {} bytes is not a whole number of {}-channel {} frames",
                bytes.len(),
                channels,
                format
            )));
        }
        Ok(view)
    }

    /// View the leading whole frames of `bytes` and return the remainder
    ///
    /// The remainder is shorter than one frame but always sample aligned.
    ///
    /// # Errors
    /// * `Invalid` - if `channels` is zero or the length is not a multiple
    ///   of the sample size
    pub fn split_whole_frames(
        bytes: &'a [u8],
        format: SampleFormat,
        channels: usize,
    ) -> Result<(Self, &'a [u8])> {
        if channels == 0 {
            return Err(VarispeedError::invalid("frames need at least one channel"));
        }
        check_sample_alignment(bytes.len(), format)?;

        let frame_size = format.frame_size(channels);
        let whole = bytes.len() - bytes.len() % frame_size;
        let (frames, rest) = bytes.split_at(whole);
        Ok((
            Self {
                bytes: frames,
                format,
                channels,
            },
            rest,
        ))
    }

    /// Encoding of the viewed samples
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn sample_count(&self) -> usize {
        self.bytes.len() / self.format.sample_size()
    }

    pub fn frame_count(&self) -> usize {
        self.bytes.len() / self.format.frame_size(self.channels)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The whole-frame bytes behind this view
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Split into sub-views of at most `max_frames` frames each
    pub fn chunks(&self, max_frames: usize) -> impl Iterator<Item = FrameView<'a>> + 'a {
        let bytes: &'a [u8] = self.bytes;
        let format = self.format;
        let channels = self.channels;
        let chunk_bytes = format.frame_size(channels) * max_frames.max(1);
        bytes.chunks(chunk_bytes).map(move |bytes| FrameView {
            bytes,
            format,
            channels,
        })
    }

    /// Decode every sample into `out`, replacing its contents
    ///
    /// # Errors
    /// * `Internal` - if `S` does not match the view's encoding
    pub fn decode_into<S: PcmSample>(&self, out: &mut Vec<S>) -> Result<()> {
        if S::FORMAT != self.format {
            return Err(VarispeedError::Internal {
                reason: format!(
                    "decoding {} frames as {} samples",
                    self.format,
                    S::FORMAT
                ),
            });
        }
        out.clear();
        out.extend(
            self.bytes
                .chunks_exact(self.format.sample_size())
                .map(S::from_le_slice),
        );
        Ok(())
    }

    /// Decode every sample into a new vector
    pub fn decode<S: PcmSample>(&self) -> Result<Vec<S>> {
        let mut out = Vec::with_capacity(self.sample_count());
        self.decode_into(&mut out)?;
        Ok(out)
    }
}

/// Append the little-endian encoding of `samples` to `out`
pub fn encode_samples<S: PcmSample>(samples: &[S], out: &mut Vec<u8>) {
    out.reserve(samples.len() * S::FORMAT.sample_size());
    for &sample in samples {
        sample.extend_le(out);
    }
}

/// Decode a sample-aligned byte buffer
///
/// # Errors
/// * `Invalid` - if the length is not a multiple of the sample size
pub fn decode_samples<S: PcmSample>(bytes: &[u8]) -> Result<Vec<S>> {
    FrameView::new(bytes, S::FORMAT, 1)?.decode()
}

// ============================================================================
// Tests
// ============================================================================
