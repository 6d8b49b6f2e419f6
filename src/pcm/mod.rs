//! Raw PCM wire format
//!
//! Interleaved little-endian samples with no container header, either
//! 16-bit signed integers or 32-bit floats.

mod format;
mod view;

pub use format::SampleFormat;
pub use view::{check_sample_alignment, decode_samples, encode_samples, FrameView, PcmSample};
