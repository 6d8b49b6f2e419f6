//! Streaming speed, pitch, rate and volume transformation
//!
//! [`Transformer`] wraps a byte sink; everything written to it is passed
//! through an engine and the transformed audio lands in the sink.
//! [`process_buffer`] is the one-shot form for audio already in memory.

mod config;
mod transformer;

pub use config::{
    with_channels, with_config, with_pitch, with_quality, with_rate, with_speed, with_volume,
    StreamConfig, StreamOption,
};
pub use transformer::{StreamState, StreamStats, Transformer, CHUNK_FRAMES};

use crate::error::{Result, VarispeedError};
use crate::pcm::SampleFormat;

/// Transform a complete in-memory buffer
///
/// Writes all of `input`, flushes, and returns the sink contents.
///
/// # Errors
/// * `Invalid` - bad sample rate or options, or `input` does not hold a
///   whole number of frames
/// * Any engine error raised while writing or flushing
pub fn process_buffer<I>(
    input: &[u8],
    sample_rate: u32,
    format: SampleFormat,
    options: I,
) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = StreamOption>,
{
    let mut output = Vec::with_capacity(input.len());
    let mut transformer = Transformer::new(&mut output, sample_rate, format, options)?;

    transformer.write_bytes(input)?;
    if transformer.pending_bytes() > 0 {
        return Err(VarispeedError::invalid(format!(
            "input of {} bytes ends with an incomplete {}-channel frame",
            input.len(),
            transformer.channels()
        )));
    }
    transformer.flush()?;
    transformer.close();
    drop(transformer);

    Ok(output)
}
